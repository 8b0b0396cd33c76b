//! Cirqoid line rules
//!
//! The Cirqoid firmware speaks a Marlin-style text protocol: `start` on
//! boot, `FIRMWARE_NAME:` identification, `X: Y: Z:` position reports,
//! `T:` temperature reports (optionally prefixed with the `ok` ack), `echo:`
//! and `Error:` messages.

use crate::firmware::{line_regex, number, LineRule};
use cncwire_core::{FirmwareInfo, HeaterReading, ParsedLine, PositionReport, TemperatureReport};
use std::collections::HashMap;

/// Boot banner (`start`)
pub struct StartupRule;

impl LineRule for StartupRule {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        (line == "start").then(|| ParsedLine::Startup {
            firmware: None,
            version: None,
            message: line.to_string(),
        })
    }
}

/// Firmware identification (`FIRMWARE_NAME:Cirqoid PROTOCOL_VERSION:1.0 ...`)
pub struct FirmwareRule;

impl FirmwareRule {
    fn fields(line: &str) -> HashMap<&str, &str> {
        let keys = line_regex!(r"(?:^|\s)([A-Z][A-Z_]+):");
        let marks: Vec<(usize, usize, &str)> = keys
            .captures_iter(line)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let key = caps.get(1)?;
                Some((whole.start(), whole.end(), key.as_str()))
            })
            .collect();

        marks
            .iter()
            .enumerate()
            .map(|(i, (_, value_start, key))| {
                let value_end = marks.get(i + 1).map(|next| next.0).unwrap_or(line.len());
                (*key, line[*value_start..value_end].trim())
            })
            .collect()
    }
}

impl LineRule for FirmwareRule {
    fn name(&self) -> &'static str {
        "firmware"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        if !line.starts_with("FIRMWARE_NAME:") {
            return None;
        }

        let fields = Self::fields(line);
        let text = |key: &str| {
            fields
                .get(key)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        let extruder_count = match fields.get("EXTRUDER_COUNT") {
            Some(count) => Some(count.parse::<u32>().ok()?),
            None => None,
        };

        Some(ParsedLine::Firmware(FirmwareInfo {
            firmware_name: text("FIRMWARE_NAME")?,
            protocol_version: text("PROTOCOL_VERSION"),
            machine_type: text("MACHINE_TYPE"),
            extruder_count,
            uuid: text("UUID"),
        }))
    }
}

/// Axis position report (`X:0.00 Y:0.00 Z:0.00 E:0.00 Count X: ...`)
pub struct PositionRule;

impl LineRule for PositionRule {
    fn name(&self) -> &'static str {
        "position"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let re = line_regex!(r"^X:\s*(\S+)\s+Y:\s*(\S+)\s+Z:\s*(\S+)(?:\s+E:\s*(\S+))?");
        let caps = re.captures(line)?;
        let e = match caps.get(4) {
            Some(e) => Some(number(e.as_str())?),
            None => None,
        };

        Some(ParsedLine::Position(PositionReport {
            x: number(&caps[1])?,
            y: number(&caps[2])?,
            z: number(&caps[3])?,
            e,
        }))
    }
}

/// Heater report (`ok T:21.3 /0.0 B:20.1 /0.0 @:0`)
pub struct TemperatureRule;

impl TemperatureRule {
    fn reading(current: Option<regex::Match<'_>>, target: Option<regex::Match<'_>>) -> Option<HeaterReading> {
        let target = match target {
            Some(target) => Some(number(target.as_str())?),
            None => None,
        };
        Some(HeaterReading {
            current: number(current?.as_str())?,
            target,
        })
    }
}

impl LineRule for TemperatureRule {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let re = line_regex!(
            r"^(?:(ok)\s+)?T:([^\s/]+)(?:\s*/\s*([^\s/]+))?(?:\s+B:([^\s/]+)(?:\s*/\s*([^\s/]+))?)?(?:\s.*)?$"
        );
        let caps = re.captures(line)?;
        let extruder = Self::reading(caps.get(2), caps.get(3))?;
        let bed = match caps.get(4) {
            Some(_) => Some(Self::reading(caps.get(4), caps.get(5))?),
            None => None,
        };

        Some(ParsedLine::Temperature(TemperatureReport {
            ok: caps.get(1).is_some(),
            extruder,
            bed,
        }))
    }
}

/// Command acknowledgment (`ok`, `ok N12`)
pub struct OkRule;

impl LineRule for OkRule {
    fn name(&self) -> &'static str {
        "ok"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        line_regex!(r"^ok(?:\s.*)?$")
            .is_match(line)
            .then_some(ParsedLine::Ok)
    }
}

/// Firmware echo (`echo:busy: processing`)
pub struct EchoRule;

impl LineRule for EchoRule {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"^echo:\s*(.*)$").captures(line)?;
        Some(ParsedLine::Echo {
            message: caps[1].to_string(),
        })
    }
}

/// Error message (`Error:Printer halted`)
pub struct ErrorRule;

impl LineRule for ErrorRule {
    fn name(&self) -> &'static str {
        "error"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"(?i)^error:\s*(.*)$").captures(line)?;
        Some(ParsedLine::Error {
            code: None,
            message: caps[1].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_fields() {
        let parsed = FirmwareRule
            .parse("FIRMWARE_NAME:Marlin 1.1.0 (Github) SOURCE_CODE_URL:https://github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0")
            .unwrap();
        match parsed {
            ParsedLine::Firmware(info) => {
                assert_eq!(info.firmware_name, "Marlin 1.1.0 (Github)");
                assert_eq!(info.protocol_version.as_deref(), Some("1.0"));
                assert_eq!(info.extruder_count, None);
            }
            other => panic!("expected firmware, got {:?}", other),
        }
    }

    #[test]
    fn test_firmware_rejects_bad_extruder_count() {
        assert!(FirmwareRule
            .parse("FIRMWARE_NAME:Cirqoid EXTRUDER_COUNT:two")
            .is_none());
        assert!(FirmwareRule.parse("PROTOCOL_VERSION:1.0").is_none());
    }

    #[test]
    fn test_position() {
        assert_eq!(
            PositionRule.parse("X:1.50 Y:-2.00 Z:0.00 E:0.00 Count X: 120 Y:-160 Z:0"),
            Some(ParsedLine::Position(PositionReport {
                x: 1.5,
                y: -2.0,
                z: 0.0,
                e: Some(0.0),
            }))
        );
        assert!(PositionRule.parse("X:abc Y:0 Z:0").is_none());
    }

    #[test]
    fn test_temperature() {
        let parsed = TemperatureRule.parse("ok T:21.3 /0.0 B:20.1 /60.0 @:0 B@:0").unwrap();
        assert_eq!(
            parsed,
            ParsedLine::Temperature(TemperatureReport {
                ok: true,
                extruder: HeaterReading {
                    current: 21.3,
                    target: Some(0.0),
                },
                bed: Some(HeaterReading {
                    current: 20.1,
                    target: Some(60.0),
                }),
            })
        );

        let parsed = TemperatureRule.parse("T:200.0").unwrap();
        assert!(!parsed.is_ack());
        assert!(TemperatureRule.parse("T:hot").is_none());
        assert!(TemperatureRule.parse("ok").is_none());
    }

    #[test]
    fn test_ok_echo_error() {
        assert_eq!(OkRule.parse("ok"), Some(ParsedLine::Ok));
        assert_eq!(OkRule.parse("ok N12"), Some(ParsedLine::Ok));
        assert_eq!(OkRule.parse("okay"), None);
        assert_eq!(
            EchoRule.parse("echo:busy: processing"),
            Some(ParsedLine::Echo {
                message: "busy: processing".to_string()
            })
        );
        assert_eq!(
            ErrorRule.parse("ERROR: Printer halted"),
            Some(ParsedLine::Error {
                code: None,
                message: "Printer halted".to_string()
            })
        );
    }
}
