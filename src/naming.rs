//! 存储文件名生成、原始文件名清洗与扩展名黑名单。

use chrono::{DateTime, Utc};
use std::collections::HashSet;

const MAX_SANITIZED_LEN: usize = 180;
const FALLBACK_NAME: &str = "file";
const RANDOM_SUFFIX_BOUND: u32 = 1_000_000_000;

/// Case-insensitive set of file extensions refused on upload.
#[derive(Debug, Clone, Default)]
pub struct ExtensionBlocklist {
    extensions: HashSet<String>,
}

impl ExtensionBlocklist {
    /// 由配置项构建黑名单（去除空白与前导点，统一小写）。
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Checks both the supplied name and the sanitized form it will be
    /// stored under, since sanitizing can surface a different extension.
    pub fn is_blocked(&self, name: &str) -> bool {
        [extension_of(name), extension_of(&sanitize_original_name(name))]
            .into_iter()
            .flatten()
            .any(|ext| self.extensions.contains(&ext))
    }
}

/// 返回文件名最后一段的扩展名（小写）。
pub fn extension_of(name: &str) -> Option<String> {
    let leaf =
        final_segment(name).trim_end_matches(|ch: char| ch == '.' || ch.is_whitespace());
    let (stem, ext) = leaf.rsplit_once('.')?;
    if stem.trim_start_matches('.').is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// 清洗用户提供的文件名，使其只能作为单个路径段使用。
pub fn sanitize_original_name(name: &str) -> String {
    let cleaned: String = final_segment(name)
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.').trim_start();
    let truncated = truncate_on_char_boundary(trimmed, MAX_SANITIZED_LEN);
    if truncated.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        truncated.to_string()
    }
}

/// Builds `{epochMillis}-{random}-{sanitizedName}`.
pub fn generate_stored_name(original: &str, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::random_range(0..RANDOM_SUFFIX_BOUND);
    format!(
        "{}-{}-{}",
        now.timestamp_millis(),
        suffix,
        sanitize_original_name(original)
    )
}

pub fn download_url(stored_name: &str) -> String {
    format!("/download/{}", urlencoding::encode(stored_name))
}

fn final_segment(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn truncate_on_char_boundary(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].trim_end()
}
