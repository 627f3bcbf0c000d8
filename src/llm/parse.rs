use serde_json::Value;

use crate::error::ParseError;
use crate::model::work_item::WorkItem;

/// Pull the work-item array out of a free-form model completion.
///
/// The span from the first `[` to the last `]` is parsed when both exist in
/// that order; otherwise the whole text is. A JSON value that is not an
/// array yields no items. Elements that do not fit the item shape are dropped.
pub fn parse_items(text: &str) -> Result<Vec<WorkItem>, ParseError> {
    let candidate = match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    let value: Value = serde_json::from_str(candidate).map_err(|source| ParseError {
        raw: text.to_string(),
        source,
    })?;

    let Value::Array(elements) = value else {
        tracing::warn!("model response JSON is not an array, ignoring it");
        return Ok(Vec::new());
    };

    let items = elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match serde_json::from_value::<WorkItem>(element) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(index, error = %e, "dropping malformed work item");
                None
            }
        })
        .collect();

    Ok(items)
}
