//! 厂商资源 URL 解析

/// 取 URL 最后一段，如 `.../zones/us-central1-a` -> `us-central1-a`
pub fn last_segment(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// zone 推导 region：`us-central1-a` -> `us-central1`；段数不足时原样返回
pub fn region_from_zone(zone: &str) -> String {
    let zone = last_segment(zone);
    let mut parts = zone.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(_)) => format!("{a}-{b}"),
        _ => zone.to_string(),
    }
}
