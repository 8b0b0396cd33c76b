//! Cirqoid firmware support
//!
//! Rule chain for the Cirqoid PCB milling machine. The combined
//! `ok T:...` line must reach the temperature rule before the bare ack rule
//! sees it, so the chain order is fixed.

mod line_parser;

pub use line_parser::{
    EchoRule, ErrorRule, FirmwareRule, OkRule, PositionRule, StartupRule, TemperatureRule,
};

use super::{LineRule, ParserFacade};

/// Cirqoid rules in priority order
pub fn rules() -> Vec<Box<dyn LineRule>> {
    vec![
        Box::new(StartupRule),
        Box::new(FirmwareRule),
        Box::new(PositionRule),
        Box::new(TemperatureRule),
        Box::new(OkRule),
        Box::new(EchoRule),
        Box::new(ErrorRule),
    ]
}

/// Parser facade over the Cirqoid chain
pub fn parser() -> ParserFacade {
    ParserFacade::new(rules())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncwire_core::{FirmwareInfo, ParsedLine, ResultKind};

    #[test]
    fn test_banner_line() {
        let result = parser().parse(
            "FIRMWARE_NAME:Cirqoid PROTOCOL_VERSION:1.0 MACHINE_TYPE:Cartesian EXTRUDER_COUNT:1 UUID:abc-123",
        );
        assert_eq!(
            result.line,
            ParsedLine::Firmware(FirmwareInfo {
                firmware_name: "Cirqoid".to_string(),
                protocol_version: Some("1.0".to_string()),
                machine_type: Some("Cartesian".to_string()),
                extruder_count: Some(1),
                uuid: Some("abc-123".to_string()),
            })
        );
    }

    #[test]
    fn test_ack_with_temperature_beats_bare_ack() {
        let result = parser().parse("ok T:21.0 /0.0");
        assert_eq!(result.kind(), ResultKind::Temperature);
        assert!(result.line.is_ack());

        assert_eq!(parser().parse("ok").kind(), ResultKind::Ok);
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(
            parser().rule_names(),
            vec!["startup", "firmware", "position", "temperature", "ok", "echo", "error"]
        );
        assert_eq!(parser().parse("start").kind(), ResultKind::Startup);
        assert_eq!(parser().parse("  echo:hi  ").kind(), ResultKind::Echo);
        assert_eq!(parser().parse("wait").kind(), ResultKind::Unrecognized);
    }
}
