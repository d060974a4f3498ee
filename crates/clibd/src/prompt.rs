//! Interactive serial port selection

use std::io::{BufRead, Write};

use anyhow::{bail, Context};
use clib_serial::transport::PortInfo;

/// Ask the user which port to open
///
/// Lists `ports` numbered from 1 and reads one line: empty accepts the
/// suggestion, a number picks from the list, anything else is taken as a
/// device path.
pub fn choose_port<R: BufRead, W: Write>(
    ports: &[PortInfo],
    suggested: Option<&PortInfo>,
    mut input: R,
    mut output: W,
) -> anyhow::Result<String> {
    writeln!(output, "Available serial ports:")?;
    if ports.is_empty() {
        writeln!(output, "  (none found)")?;
    }
    for (i, port) in ports.iter().enumerate() {
        let marker = if Some(port) == suggested { "*" } else { " " };
        writeln!(output, " {}{:>2}) {}", marker, i + 1, port.label())?;
    }
    match suggested {
        Some(port) => write!(output, "Port? [{}] ", port.path)?,
        None => write!(output, "Port? ")?,
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read port selection")?;
    let answer = line.trim();

    if answer.is_empty() {
        return match suggested {
            Some(port) => Ok(port.path.clone()),
            None => bail!("No port selected"),
        };
    }
    if let Ok(index) = answer.parse::<usize>() {
        return match index.checked_sub(1).and_then(|i| ports.get(i)) {
            Some(port) => Ok(port.path.clone()),
            None => bail!("No port numbered {}", index),
        };
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortInfo> {
        vec![
            PortInfo::new("/dev/ttyS0"),
            PortInfo {
                path: "/dev/ttyACM0".to_string(),
                manufacturer: Some("Arduino (www.arduino.cc)".to_string()),
                product: None,
            },
        ]
    }

    fn choose(input: &str, suggested: Option<usize>) -> anyhow::Result<String> {
        let ports = ports();
        let suggested = suggested.map(|i| &ports[i]);
        choose_port(&ports, suggested, input.as_bytes(), Vec::new())
    }

    #[test]
    fn test_empty_answer_accepts_suggestion() {
        assert_eq!(choose("\n", Some(1)).unwrap(), "/dev/ttyACM0");
    }

    #[test]
    fn test_empty_answer_without_suggestion_fails() {
        assert!(choose("\n", None).is_err());
    }

    #[test]
    fn test_pick_by_number() {
        assert_eq!(choose("1\n", Some(1)).unwrap(), "/dev/ttyS0");
        assert!(choose("3\n", None).is_err());
        assert!(choose("0\n", None).is_err());
    }

    #[test]
    fn test_literal_path() {
        assert_eq!(choose("/dev/ttyUSB3\n", None).unwrap(), "/dev/ttyUSB3");
    }

    #[test]
    fn test_listing_marks_suggestion() {
        let ports = ports();
        let mut output = Vec::new();
        choose_port(&ports, Some(&ports[1]), "\n".as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("   1) /dev/ttyS0"));
        assert!(text.contains(" * 2) /dev/ttyACM0 (Arduino (www.arduino.cc))"));
        assert!(text.ends_with("Port? [/dev/ttyACM0] "));
    }
}
