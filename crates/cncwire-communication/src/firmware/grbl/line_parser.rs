//! Grbl line rules

use super::error_decoder::{decode_alarm, decode_error};
use super::status_parser::parse_status;
use crate::firmware::{line_regex, number, LineRule};
use cncwire_core::ParsedLine;

/// Split `N` vs free text after `error:` / `ALARM:`
fn coded_message(text: &str, decode: fn(u16) -> String) -> (Option<u16>, String) {
    let text = text.trim();
    match text.parse::<u16>() {
        Ok(code) => (Some(code), decode(code)),
        Err(_) => (None, text.to_string()),
    }
}

/// Realtime status report (`<Idle|MPos:...>`)
pub struct StatusRule;

impl LineRule for StatusRule {
    fn name(&self) -> &'static str {
        "status"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        parse_status(line).map(ParsedLine::Status)
    }
}

/// Command acknowledgment
pub struct OkRule;

impl LineRule for OkRule {
    fn name(&self) -> &'static str {
        "ok"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        (line == "ok").then_some(ParsedLine::Ok)
    }
}

/// Command error (`error:22`, or free text on Grbl 0.9)
pub struct ErrorRule;

impl LineRule for ErrorRule {
    fn name(&self) -> &'static str {
        "error"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"^error:\s*(.*)$").captures(line)?;
        let (code, message) = coded_message(&caps[1], decode_error);
        Some(ParsedLine::Error { code, message })
    }
}

/// Alarm (`ALARM:1`)
pub struct AlarmRule;

impl LineRule for AlarmRule {
    fn name(&self) -> &'static str {
        "alarm"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"(?i)^ALARM:\s*(.*)$").captures(line)?;
        let (code, message) = coded_message(&caps[1], decode_alarm);
        Some(ParsedLine::Alarm { code, message })
    }
}

/// G-code parser state (`[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]`)
pub struct ParserStateRule;

impl LineRule for ParserStateRule {
    fn name(&self) -> &'static str {
        "parser-state"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let re = line_regex!(r"^\[(?:GC:)?([GMTFS]-?[\d.]+(?:\s+[GMTFS]-?[\d.]+)*)\]$");
        let caps = re.captures(line)?;

        let mut modal = Vec::new();
        let mut tool = None;
        let mut feed_rate = None;
        let mut spindle_speed = None;
        for word in caps[1].split_whitespace() {
            let (letter, value) = word.split_at(1);
            match letter {
                "T" => tool = Some(value.parse::<u32>().ok()?),
                "F" => feed_rate = Some(number(value)?),
                "S" => spindle_speed = Some(number(value)?),
                _ => modal.push(word.to_string()),
            }
        }

        Some(ParsedLine::ParserState {
            modal,
            tool,
            feed_rate,
            spindle_speed,
        })
    }
}

/// Stored parameters (`[G54:0.000,0.000,0.000]`, `[PRB:0,0,0:1]`)
pub struct ParametersRule;

impl LineRule for ParametersRule {
    fn name(&self) -> &'static str {
        "parameters"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let re = line_regex!(r"^\[(G5[4-9]|G28|G30|G92|TLO|PRB):(.*)\]$");
        let caps = re.captures(line)?;
        Some(ParsedLine::Parameters {
            name: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }
}

/// Feedback message (`[MSG:Caution: Unlocked]`, `[VER:1.1h.20190825:]`)
pub struct FeedbackRule;

impl LineRule for FeedbackRule {
    fn name(&self) -> &'static str {
        "feedback"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"^\[(?:MSG:)?(.*)\]$").captures(line)?;
        Some(ParsedLine::Feedback {
            message: caps[1].to_string(),
        })
    }
}

/// Firmware setting (`$110=500.000 (x max rate, mm/min)`)
pub struct SettingRule;

impl LineRule for SettingRule {
    fn name(&self) -> &'static str {
        "setting"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let re = line_regex!(r"^\$(\d+)=(\S*)(?:\s*\((.*)\))?\s*$");
        let caps = re.captures(line)?;
        Some(ParsedLine::Setting {
            number: caps[1].parse::<u16>().ok()?,
            value: caps[2].to_string(),
            description: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

/// Boot banner (`Grbl 1.1h ['$' for help]`)
pub struct StartupRule;

impl LineRule for StartupRule {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = line_regex!(r"^(Grbl\w*)\s+(\S+)\s*(.*)$").captures(line)?;
        Some(ParsedLine::Startup {
            firmware: Some(caps[1].to_string()),
            version: Some(caps[2].to_string()),
            message: caps[3].to_string(),
        })
    }
}
