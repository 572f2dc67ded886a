//! 通用工具函数

use chrono::NaiveTime;

use crate::{MedmisError, Result};

/// 解析 "HH:mm" 格式的时刻
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| MedmisError::Validation(format!("invalid time '{}': {}", value, e)))
}

/// 格式化为 "HH:mm"
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// 两个半开区间 [a_start, a_end) 与 [b_start, b_end) 是否重叠
pub fn ranges_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// 检查一组半开区间内部是否存在两两重叠
///
/// 排序后只需比较相邻区间。
pub fn has_internal_overlap(ranges: &[(NaiveTime, NaiveTime)]) -> bool {
    let mut sorted: Vec<_> = ranges.to_vec();
    sorted.sort_by_key(|r| r.0);
    sorted.windows(2).any(|w| w[0].1 > w[1].0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("08:30").unwrap(), t(8, 30));
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("abc").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(format_hhmm(t(9, 5)), "09:05");
    }

    #[test]
    fn test_ranges_overlap() {
        assert!(ranges_overlap(t(12, 0), t(13, 0), t(12, 30), t(14, 0)));
        // 首尾相接不重叠
        assert!(!ranges_overlap(t(12, 0), t(13, 0), t(13, 0), t(14, 0)));
    }

    #[test]
    fn test_has_internal_overlap() {
        assert!(!has_internal_overlap(&[
            (t(8, 0), t(9, 0)),
            (t(9, 0), t(10, 0)),
        ]));
        assert!(has_internal_overlap(&[
            (t(8, 0), t(9, 30)),
            (t(9, 0), t(10, 0)),
        ]));
    }
}
