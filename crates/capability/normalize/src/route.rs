use crate::decode::DEFAULT_TEXT;

/// 取 topic 第二段作为 measurement（如 `sensors/temperature` → `temperature`）。
///
/// 末尾的空段不计入段数（`sensors/`、`sensors//` 视为一段）；
/// 不足两段时返回 `unknown`，其余段内容不做校验。
pub fn derive_measurement(topic: &str) -> String {
    let segments: Vec<&str> = topic.split('/').collect();
    let significant = segments
        .iter()
        .rposition(|segment| !segment.is_empty())
        .map_or(0, |last| last + 1);
    if significant < 2 {
        return DEFAULT_TEXT.to_string();
    }
    segments[1].to_string()
}
