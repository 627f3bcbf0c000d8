use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::{self, AppConfig};
use crate::llm::{GenerateError, LlmClient};
use crate::model::chat::ChatMessage;
use crate::model::work_item::WorkItem;
use crate::pipeline::{self, CreateIssuesRequest, CreationReport, RequestError, SkipReason};
use crate::session::{export_markdown, ResponseLog, SessionStore};
use crate::tracker::jira::JiraClient;
use crate::tracker::{CloudAuth, IssueTracker};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Generate {
        input: String,
        output: Option<PathBuf>,
    },
    Push {
        items_file: PathBuf,
        project_key: String,
    },
    Projects,
    Issues {
        project_key: String,
    },
    Chat {
        session: String,
        message: String,
        save: bool,
    },
    ResetChat {
        session: String,
    },
    Responses(ResponsesAction),
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResponsesAction {
    List,
    Clear,
    Export(PathBuf),
}

/// Parse command-line arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "generate" | "gen" => {
            let mut input = None;
            let mut output = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "-o" | "--output" => {
                        i += 1;
                        let Some(path) = rest.get(i) else {
                            bail!("Missing value for -o/--output flag");
                        };
                        output = Some(PathBuf::from(path));
                    }
                    other if input.is_none() => input = Some(other.to_string()),
                    other => bail!("Unexpected argument: {other}"),
                }
                i += 1;
            }
            let Some(input) = input else {
                bail!("Usage: reqjira generate <requirements-file|-> [-o items.json]");
            };
            Ok(Command::Generate { input, output })
        }
        "push" => {
            let mut items_file = None;
            let mut project_key = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "-p" | "--project" => {
                        i += 1;
                        let Some(key) = rest.get(i) else {
                            bail!("Missing value for -p/--project flag");
                        };
                        project_key = Some(key.clone());
                    }
                    other if items_file.is_none() => items_file = Some(PathBuf::from(other)),
                    other => bail!("Unexpected argument: {other}"),
                }
                i += 1;
            }
            match (items_file, project_key) {
                (Some(items_file), Some(project_key)) => Ok(Command::Push {
                    items_file,
                    project_key,
                }),
                _ => bail!("Usage: reqjira push <items.json> -p <PROJECT>"),
            }
        }
        "projects" => Ok(Command::Projects),
        "issues" => match rest.first() {
            Some(key) => Ok(Command::Issues {
                project_key: key.clone(),
            }),
            None => bail!("Usage: reqjira issues <PROJECT>"),
        },
        "chat" => {
            let Some((session, words)) = rest.split_first() else {
                bail!("Usage: reqjira chat <session> <message> [--save] | reqjira chat <session> --reset");
            };
            let mut save = false;
            let mut parts = Vec::new();
            for word in words {
                match word.as_str() {
                    "--save" => save = true,
                    "--reset" => {
                        return Ok(Command::ResetChat {
                            session: session.clone(),
                        })
                    }
                    _ => parts.push(word.as_str()),
                }
            }
            let message = parts.join(" ");
            if message.trim().is_empty() {
                bail!("Chat message cannot be empty");
            }
            Ok(Command::Chat {
                session: session.clone(),
                message,
                save,
            })
        }
        "responses" => match rest.first().map(String::as_str) {
            None | Some("list") => Ok(Command::Responses(ResponsesAction::List)),
            Some("clear") => Ok(Command::Responses(ResponsesAction::Clear)),
            Some("export") => match rest.get(1) {
                Some(path) => Ok(Command::Responses(ResponsesAction::Export(PathBuf::from(path)))),
                None => bail!("Usage: reqjira responses export <file>"),
            },
            Some(other) => bail!("Unknown responses action: {other}"),
        },
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command: {other}. Run `reqjira help` for usage."),
    }
}

pub async fn run(command: Command, config: AppConfig) -> Result<()> {
    match command {
        Command::Generate { input, output } => handle_generate(&config, &input, output).await,
        Command::Push {
            items_file,
            project_key,
        } => handle_push(&config, &items_file, project_key).await,
        Command::Projects => handle_projects(&config).await,
        Command::Issues { project_key } => handle_issues(&config, &project_key).await,
        Command::Chat {
            session,
            message,
            save,
        } => handle_chat(&config, &session, &message, save).await,
        Command::ResetChat { session } => {
            SessionStore::new(&config::data_dir()).delete(&session)?;
            println!("Cleared chat session {session}");
            Ok(())
        }
        Command::Responses(action) => handle_responses(action),
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read requirements from stdin")
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

async fn handle_generate(config: &AppConfig, input: &str, output: Option<PathBuf>) -> Result<()> {
    let requirements = read_input(input)?;
    if requirements.trim().is_empty() {
        bail!("Requirements text is empty");
    }

    let llm = LlmClient::from_config(&config.llm)?;
    let result = match llm.generate_items(&requirements).await {
        Ok(result) => result,
        Err(GenerateError::Parse(e)) => {
            eprintln!("Model response:\n{}\n", e.raw);
            return Err(e).context("Failed to generate work items");
        }
        Err(e) => return Err(e).context("Failed to generate work items"),
    };

    let counts: Vec<String> = result
        .type_counts()
        .iter()
        .map(|(kind, n)| format!("{n} {}", kind.plural()))
        .collect();

    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&result)?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Generated {} in {}ms", counts.join(", "), result.processing_time_ms);
            println!("  saved to {}", path.display());
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&result.items)?);
            eprintln!("Generated {}", counts.join(", "));
        }
    }
    Ok(())
}

/// Accept either a bare item array or a saved generation result.
pub fn parse_items_file(contents: &str) -> Result<Vec<WorkItem>> {
    let value: Value = serde_json::from_str(contents).context("Items file is not valid JSON")?;
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(items) => items,
            None => bail!("Items file has no \"items\" field"),
        },
        _ => bail!("Items file must contain a JSON array of work items"),
    };
    serde_json::from_value(items).context("Items file contains malformed work items")
}

fn rejected(e: RequestError) -> anyhow::Error {
    let status = e.status_code();
    anyhow::Error::new(e).context(format!("JIRA request rejected ({status})"))
}

async fn handle_push(config: &AppConfig, items_file: &Path, project_key: String) -> Result<()> {
    let contents = std::fs::read_to_string(items_file)
        .with_context(|| format!("Failed to read {}", items_file.display()))?;
    let items = parse_items_file(&contents)?;

    let tracker = JiraClient::new(config.jira.api_base(), config.jira.epic_link_field());
    let request = CreateIssuesRequest { project_key, items };
    let response = pipeline::create_issues(
        &tracker,
        &config.jira,
        &config.creation,
        request,
        chrono::Utc::now().timestamp_millis(),
    )
    .await
    .map_err(rejected)?;

    println!("{}", response.message);
    let report = CreationReport {
        created: response.created_issues,
        not_created: response.not_created,
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &CreationReport) {
    for (kind, _) in report.counts() {
        for created in report.created.of_kind(kind) {
            match &created.parent_key {
                Some(parent) => println!("  {kind:<8} {:<10} {} (under {parent})", created.key, created.summary),
                None => println!("  {kind:<8} {:<10} {}", created.key, created.summary),
            }
        }
    }
    if !report.not_created.is_empty() {
        println!("\nNot created:");
        for skipped in &report.not_created {
            let why = match &skipped.reason {
                SkipReason::UnresolvedParent { parent: Some(p) } => format!("parent \"{p}\" was not created"),
                SkipReason::UnresolvedParent { parent: None } => "no parent given".to_string(),
                SkipReason::Failed { error } => error.clone(),
            };
            println!("  {:<8} {} — {why}", skipped.kind, skipped.summary);
        }
    }
}

async fn cloud_auth(config: &AppConfig, tracker: &dyn IssueTracker) -> Result<CloudAuth> {
    let token = config
        .jira
        .bearer_token(chrono::Utc::now().timestamp_millis())?;
    let cloud_id = pipeline::resolve_cloud_id(tracker, &config.jira, token).await?;
    Ok(CloudAuth {
        token: token.to_string(),
        cloud_id,
    })
}

async fn handle_projects(config: &AppConfig) -> Result<()> {
    let tracker = JiraClient::new(config.jira.api_base(), config.jira.epic_link_field());
    let auth = cloud_auth(config, &tracker).await?;
    let projects = tracker
        .list_projects(&auth)
        .await
        .context("Failed to fetch JIRA projects")?;
    if projects.is_empty() {
        println!("No projects found");
    }
    for project in projects {
        println!("{:<10} {}", project.key, project.name);
    }
    Ok(())
}

async fn handle_issues(config: &AppConfig, project_key: &str) -> Result<()> {
    let tracker = JiraClient::new(config.jira.api_base(), config.jira.epic_link_field());
    let auth = cloud_auth(config, &tracker).await?;
    let issues = tracker
        .list_issues(&auth, project_key)
        .await
        .context("Failed to fetch JIRA issues")?;
    for issue in issues {
        let kind = issue
            .fields
            .issuetype
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("?");
        let status = issue
            .fields
            .status
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("");
        println!("{:<10} {kind:<8} {status:<12} {}", issue.key, issue.summary());
        if let Some(description) = issue.description_text() {
            let short: String = description.chars().take(120).collect();
            println!("           {short}");
        }
    }
    Ok(())
}

async fn handle_chat(config: &AppConfig, session_id: &str, message: &str, save: bool) -> Result<()> {
    let data_dir = config::data_dir();
    let store = SessionStore::new(&data_dir);
    let mut session = store.load(session_id)?;

    let llm = LlmClient::from_config(&config.llm)?;
    let reply = llm
        .chat(&mut session, message)
        .await
        .context("Chat request failed")?;
    store.save(&session)?;

    if save {
        ResponseLog::new(&data_dir).save(&ChatMessage::assistant(reply.clone()))?;
    }
    println!("{reply}");
    Ok(())
}

fn handle_responses(action: ResponsesAction) -> Result<()> {
    let log = ResponseLog::new(&config::data_dir());
    match action {
        ResponsesAction::List => {
            let saved = log.read_all();
            if saved.is_empty() {
                println!("No saved responses");
            }
            for message in saved {
                println!("[{}]", message.timestamp.as_deref().unwrap_or("-"));
                println!("{}\n", message.content.trim_end());
            }
        }
        ResponsesAction::Clear => {
            log.clear()?;
            println!("Cleared saved responses");
        }
        ResponsesAction::Export(path) => {
            let saved = log.read_all();
            if saved.is_empty() {
                bail!("No saved responses to export");
            }
            std::fs::write(&path, export_markdown(&saved))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} responses to {}", saved.len(), path.display());
        }
    }
    Ok(())
}

pub fn print_help() {
    println!("reqjira — turn requirements into a JIRA issue hierarchy\n");
    println!("USAGE:");
    println!("  reqjira generate <file|-> [-o items.json]  Ask the model for Epics, Stories, Tasks and Sub-tasks");
    println!("  reqjira push <items.json> -p <PROJECT>     Create the items in JIRA, parents first");
    println!("  reqjira projects                           List JIRA projects");
    println!("  reqjira issues <PROJECT>                   List recent issues in a project");
    println!("  reqjira chat <session> <message> [--save]  Talk through requirements with the model");
    println!("  reqjira chat <session> --reset             Forget a chat session");
    println!("  reqjira responses [list|clear|export <f>]  Manage saved chat replies");
    println!();
    println!("Configuration lives in ~/.reqjira/config.toml; RUST_LOG controls log output.");
}
