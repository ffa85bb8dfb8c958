use std::time::Duration;

/// `850ms`, `12.3s`, `4m05s`, `1h02m03s`
pub fn format_duration_human(duration: &Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1. {
        let msec = (secs * 1000.).round() as u64;
        if msec == 0 && !duration.is_zero() {
            "<1ms".to_string()
        } else {
            format!("{}ms", msec)
        }
    } else if secs < 60. {
        format!("{:.1}s", secs)
    } else {
        let secs = secs.round() as u64;
        let (min, sec) = (secs / 60, secs % 60);
        if min < 60 {
            format!("{}m{:02}s", min, sec)
        } else {
            format!("{}h{:02}m{:02}s", min / 60, min % 60, sec)
        }
    }
}

/// For the "finished" log line
pub fn format_duration(d: Duration) -> String {
    if d.as_secs_f64() < 60. {
        format!("{:.1}sec", d.as_secs_f64())
    } else {
        format!("{} ( {:.1}sec )", format_duration_human(&d), d.as_secs_f64())
    }
}

/// Byte count as kibibytes, `12.3 KB`
pub fn format_kib(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration_human(&Duration::ZERO), "0ms");
        assert_eq!(format_duration_human(&Duration::from_micros(10)), "<1ms");
        assert_eq!(format_duration_human(&Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration_human(&Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_duration_human(&Duration::from_secs(245)), "4m05s");
        assert_eq!(format_duration_human(&Duration::from_secs(3723)), "1h02m03s");

        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5sec");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s ( 90.0sec )");
    }

    #[test]
    fn kib() {
        assert_eq!(format_kib(0), "0.0 KB");
        assert_eq!(format_kib(1024), "1.0 KB");
        assert_eq!(format_kib(1536), "1.5 KB");
    }
}
