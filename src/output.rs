use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;

use crate::report::DeviceRecord;

/// How the report is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Write `devices` in the requested format. The IPv6 column only appears when
/// `with_ipv6` is set.
pub fn render(
    out: &mut impl Write,
    devices: &[DeviceRecord],
    format: OutputFormat,
    with_ipv6: bool,
) -> Result<()> {
    match format {
        OutputFormat::Table => write_table(out, devices, with_ipv6),
        OutputFormat::Json => write_json(out, devices, with_ipv6),
        OutputFormat::Csv => write_csv(out, devices, with_ipv6),
    }
}

fn columns(with_ipv6: bool) -> Vec<&'static str> {
    let mut cols = vec!["Hostname", "IPv4"];
    if with_ipv6 {
        cols.push("IPv6");
    }
    cols.extend(["MAC", "Vendor"]);
    cols
}

fn row(device: &DeviceRecord, with_ipv6: bool, missing: &str) -> Vec<String> {
    let mut cells = vec![
        device.hostname.clone().unwrap_or_else(|| missing.to_string()),
        device.ipv4.to_string(),
    ];
    if with_ipv6 {
        cells.push(
            device
                .ipv6
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| missing.to_string()),
        );
    }
    cells.push(device.hardware_address.to_string());
    cells.push(device.vendor.clone().unwrap_or_else(|| missing.to_string()));
    cells
}

fn write_table(out: &mut impl Write, devices: &[DeviceRecord], with_ipv6: bool) -> Result<()> {
    let header: Vec<String> = columns(with_ipv6).into_iter().map(String::from).collect();
    let rows: Vec<Vec<String>> = devices.iter().map(|d| row(d, with_ipv6, "-")).collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    for cells in std::iter::once(&header).chain(&rows) {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        writeln!(out, "{}", line.join("  ").trim_end())?;
    }

    Ok(())
}

fn write_json(out: &mut impl Write, devices: &[DeviceRecord], with_ipv6: bool) -> Result<()> {
    let mut value = serde_json::to_value(devices)?;
    if !with_ipv6 {
        if let Some(records) = value.as_array_mut() {
            for record in records.iter_mut().filter_map(|r| r.as_object_mut()) {
                record.remove("ipv6");
            }
        }
    }

    serde_json::to_writer_pretty(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}

fn write_csv(out: &mut impl Write, devices: &[DeviceRecord], with_ipv6: bool) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(columns(with_ipv6))?;
    for device in devices {
        wtr.write_record(row(device, with_ipv6, ""))?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn devices() -> Vec<DeviceRecord> {
        vec![
            DeviceRecord {
                hostname: Some("router.lan".to_string()),
                ipv4: Ipv4Addr::new(192, 168, 1, 1),
                ipv6: Some("fe80::1".parse().unwrap()),
                hardware_address: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
                vendor: Some("Acme, Inc.".to_string()),
            },
            DeviceRecord {
                hostname: None,
                ipv4: Ipv4Addr::new(192, 168, 1, 20),
                ipv6: None,
                hardware_address: "00:11:22:33:44:55".parse().unwrap(),
                vendor: None,
            },
        ]
    }

    fn rendered(format: OutputFormat, with_ipv6: bool) -> String {
        let mut buf = Vec::new();
        render(&mut buf, &devices(), format, with_ipv6).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_table() {
        let text = rendered(OutputFormat::Table, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Hostname    IPv4          MAC                Vendor");
        assert_eq!(lines[1], "router.lan  192.168.1.1   AA:BB:CC:DD:EE:FF  Acme, Inc.");
        assert_eq!(lines[2], "-           192.168.1.20  00:11:22:33:44:55  -");
    }

    #[test]
    fn test_table_with_ipv6() {
        let text = rendered(OutputFormat::Table, true);
        assert!(text.lines().next().unwrap().contains("IPv6"));
        assert!(text.contains("fe80::1"));
    }

    #[test]
    fn test_json_drops_ipv6_unless_requested() {
        let without: serde_json::Value =
            serde_json::from_str(&rendered(OutputFormat::Json, false)).unwrap();
        assert!(without[0].get("ipv6").is_none());
        assert_eq!(without[0]["hardware_address"], "AA:BB:CC:DD:EE:FF");

        let with: serde_json::Value =
            serde_json::from_str(&rendered(OutputFormat::Json, true)).unwrap();
        assert_eq!(with[0]["ipv6"], "fe80::1");
        assert!(with[1]["ipv6"].is_null());
    }

    #[test]
    fn test_csv() {
        let text = rendered(OutputFormat::Csv, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Hostname,IPv4,MAC,Vendor");
        assert_eq!(lines[1], "router.lan,192.168.1.1,AA:BB:CC:DD:EE:FF,\"Acme, Inc.\"");
        assert_eq!(lines[2], ",192.168.1.20,00:11:22:33:44:55,");
    }
}
