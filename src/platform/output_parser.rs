//! Parsers for OS utility output
//!
//! Every function here is total: malformed input degrades to `0`, `0.0`,
//! `false` or `None` for the affected field instead of returning an error, so a
//! changed column layout on some OS version can never break `status`.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeMap;

use crate::core::models::ProcessInfo;

/// Convert a `ps` elapsed-time field into seconds.
///
/// Accepts `SS`, `MM:SS`, `HH:MM:SS` and `DD-HH:MM:SS`. A segment that does
/// not parse counts as zero; the other segments are kept.
pub fn parse_elapsed_seconds(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let (days, clock) = match trimmed.split_once('-') {
        Some((days, clock)) => (segment(days), clock),
        None => (0, trimmed),
    };

    let mut seconds = 0u64;
    // seconds, minutes, hours from the right
    for (part, unit) in clock.rsplit(':').zip([1u64, 60, 3600]) {
        seconds = seconds.saturating_add(segment(part).saturating_mul(unit));
    }

    seconds.saturating_add(days.saturating_mul(86_400))
}

fn segment(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}

/// `ps` reports resident set size in KiB; returns bytes.
pub fn parse_rss_bytes(raw: &str) -> u64 {
    raw.trim()
        .parse::<u64>()
        .map(|kib| kib.saturating_mul(1024))
        .unwrap_or(0)
}

/// Plain byte count as printed by Windows utilities.
pub fn parse_byte_count(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}

/// CPU percentage. Values above 100 (multi-core attribution) are preserved.
pub fn parse_cpu_percent(raw: &str) -> f64 {
    let normalized = raw.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => 0.0,
    }
}

/// Parse the output of `ps -p <pid> -o comm,etime,rss,%cpu`.
///
/// The first non-empty line is the header and is discarded; the first data row
/// is used. The command column may contain spaces, so the three numeric
/// columns are taken from the right.
pub fn parse_ps_row(output: &str, pid: u32, now: DateTime<Utc>) -> Option<ProcessInfo> {
    let row = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .nth(1)?;

    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }

    let (command, metrics) = fields.split_at(fields.len() - 3);
    let command = command.join(" ");
    if command.is_empty() {
        return None;
    }

    let elapsed = parse_elapsed_seconds(metrics[0]);
    Some(ProcessInfo {
        pid,
        command,
        start_time: start_time_from_elapsed(now, elapsed),
        memory_usage: parse_rss_bytes(metrics[1]),
        cpu_usage: parse_cpu_percent(metrics[2]),
    })
}

pub fn start_time_from_elapsed(now: DateTime<Utc>, elapsed_secs: u64) -> DateTime<Utc> {
    i64::try_from(elapsed_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|elapsed| now.checked_sub_signed(elapsed))
        .unwrap_or(now)
}

/// Parse a WMI CIM_DATETIME value such as `20240115143022.123456+060`.
///
/// Only the leading `YYYYMMDDHHMMSS` digits are used; the fractional part and
/// the UTC offset suffix are ignored and the value is read as local time.
pub fn parse_wmi_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let digits = trimmed.get(..14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Whether `tasklist /FI "PID eq <pid>" /FO CSV` output lists `pid`.
///
/// The header row is skipped. When nothing matches, tasklist prints a single
/// informational line, which is treated as the header.
pub fn tasklist_contains_pid(output: &str, pid: u32) -> bool {
    let wanted = pid.to_string();
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .any(|line| {
            split_csv_line(line)
                .get(1)
                .map(|field| field == &wanted)
                .unwrap_or(false)
        })
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.trim().chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Parse `wmic ... /format:list` output into key/value pairs.
pub fn parse_wmic_list(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Build a `ProcessInfo` from the Windows process query and a one-shot CPU
/// sample. A missing image name means the process was not found.
pub fn parse_windows_process_info(
    process_output: &str,
    cpu_output: &str,
    pid: u32,
    now: DateTime<Utc>,
) -> Option<ProcessInfo> {
    let fields = parse_wmic_list(process_output);
    let command = fields.get("Name").filter(|name| !name.is_empty())?.clone();

    let start_time = fields
        .get("CreationDate")
        .and_then(|raw| parse_wmi_datetime(raw))
        .unwrap_or(now);
    let memory_usage = fields
        .get("WorkingSetSize")
        .map(|raw| parse_byte_count(raw))
        .unwrap_or(0);
    let cpu_usage = parse_wmic_list(cpu_output)
        .get("PercentProcessorTime")
        .map(|raw| parse_cpu_percent(raw))
        .unwrap_or(0.0);

    Some(ProcessInfo {
        pid,
        command,
        start_time,
        memory_usage,
        cpu_usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("05:30", 330 ; "minutes and seconds")]
    #[test_case("01:05:30", 3930 ; "hours")]
    #[test_case("2-01:05:30", 176_730 ; "days")]
    #[test_case("42", 42 ; "seconds only")]
    #[test_case("", 0 ; "empty")]
    #[test_case("   ", 0 ; "whitespace")]
    #[test_case("xx:30", 30 ; "malformed minutes default to zero")]
    #[test_case("1-xx:00:10", 86_410 ; "malformed hours keep days")]
    #[test_case("garbage", 0 ; "garbage")]
    fn elapsed_formats(raw: &str, expected: u64) {
        assert_eq!(parse_elapsed_seconds(raw), expected);
    }

    #[test]
    fn rss_is_converted_to_bytes() {
        assert_eq!(parse_rss_bytes("2048"), 2048 * 1024);
        assert_eq!(parse_rss_bytes("-"), 0);
        assert_eq!(parse_rss_bytes(""), 0);
    }

    #[test]
    fn cpu_is_not_clamped() {
        assert_eq!(parse_cpu_percent("12.5"), 12.5);
        assert_eq!(parse_cpu_percent("250.0"), 250.0);
        assert_eq!(parse_cpu_percent("3,5"), 3.5);
        assert_eq!(parse_cpu_percent("n/a"), 0.0);
    }

    #[test]
    fn ps_row_is_parsed_after_header() {
        let now = Utc::now();
        let output = "COMMAND         ELAPSED   RSS %CPU\nsleep             01:05   892  0.0\n";
        let info = parse_ps_row(output, 4242, now).expect("row");

        assert_eq!(info.pid, 4242);
        assert_eq!(info.command, "sleep");
        assert_eq!(info.memory_usage, 892 * 1024);
        assert_eq!(info.cpu_usage, 0.0);
        assert_eq!(info.start_time, now - ChronoDuration::seconds(65));
    }

    #[test]
    fn ps_command_with_spaces() {
        let now = Utc::now();
        let output = "COMMAND ELAPSED RSS %CPU\nGoogle Chrome H 2-00:00:00 10240 101.3\n";
        let info = parse_ps_row(output, 7, now).expect("row");
        assert_eq!(info.command, "Google Chrome H");
        assert_eq!(info.cpu_usage, 101.3);
        assert_eq!(info.start_time, now - ChronoDuration::days(2));
    }

    #[test]
    fn ps_without_rows_is_none() {
        let now = Utc::now();
        assert!(parse_ps_row("COMMAND ELAPSED RSS %CPU\n", 1, now).is_none());
        assert!(parse_ps_row("", 1, now).is_none());
        assert!(parse_ps_row("HEADER\nonly two\n", 1, now).is_none());
    }

    #[test]
    fn wmi_datetime_ignores_fraction_and_offset() {
        let expected = Local
            .with_ymd_and_hms(2024, 1, 15, 14, 30, 22)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            parse_wmi_datetime("20240115143022.123456+060"),
            Some(expected)
        );
        assert_eq!(parse_wmi_datetime("20240115143022"), Some(expected));
    }

    #[test]
    fn wmi_datetime_rejects_garbage() {
        assert_eq!(parse_wmi_datetime(""), None);
        assert_eq!(parse_wmi_datetime("2024-01-15 14:30"), None);
        assert_eq!(parse_wmi_datetime("20241399999999.000000+000"), None);
    }

    #[test]
    fn tasklist_rows_beyond_header() {
        let found = "\"Image Name\",\"PID\",\"Session Name\",\"Session#\",\"Mem Usage\"\r\n\
                     \"node.exe\",\"5120\",\"Console\",\"1\",\"45,000 K\"\r\n";
        assert!(tasklist_contains_pid(found, 5120));
        assert!(!tasklist_contains_pid(found, 512));

        let missing = "INFO: No tasks are running which match the specified criteria.\r\n";
        assert!(!tasklist_contains_pid(missing, 5120));
    }

    #[test]
    fn windows_process_info_degrades_per_field() {
        let now = Utc::now();
        let process = "\r\r\nCreationDate=not-a-date\r\r\nName=node.exe\r\r\nWorkingSetSize=52428800\r\r\n";
        let info = parse_windows_process_info(process, "", 5120, now).expect("info");

        assert_eq!(info.command, "node.exe");
        assert_eq!(info.start_time, now);
        assert_eq!(info.memory_usage, 52_428_800);
        assert_eq!(info.cpu_usage, 0.0);

        let cpu = "PercentProcessorTime=7\r\r\n";
        let info = parse_windows_process_info(process, cpu, 5120, now).expect("info");
        assert_eq!(info.cpu_usage, 7.0);

        assert!(parse_windows_process_info("No Instance(s) Available.", "", 5120, now).is_none());
    }
}
