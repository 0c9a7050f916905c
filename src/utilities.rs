// src/utilities.rs

/// 补全缺少协议的落地页地址
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if has_scheme(url) {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn has_scheme(url: &str) -> bool {
    match url.find("://") {
        Some(pos) if pos > 0 => url[..pos].chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}
