//! Grbl firmware support
//!
//! Rule chain for Grbl 0.9 and 1.1: realtime status reports, acks,
//! error/alarm codes, bracketed feedback, settings and the boot banner.
//! Bracketed rules run most specific first (parser state, then stored
//! parameters, then generic feedback).

mod error_decoder;
mod line_parser;
mod status_parser;

pub use error_decoder::{decode_alarm, decode_error};
pub use line_parser::{
    AlarmRule, ErrorRule, FeedbackRule, OkRule, ParametersRule, ParserStateRule, SettingRule,
    StartupRule, StatusRule,
};
pub use status_parser::parse_status;

use super::{LineRule, ParserFacade};

/// Grbl rules in priority order
pub fn rules() -> Vec<Box<dyn LineRule>> {
    vec![
        Box::new(StatusRule),
        Box::new(OkRule),
        Box::new(ErrorRule),
        Box::new(AlarmRule),
        Box::new(ParserStateRule),
        Box::new(ParametersRule),
        Box::new(FeedbackRule),
        Box::new(SettingRule),
        Box::new(StartupRule),
    ]
}

/// Parser facade over the Grbl chain
pub fn parser() -> ParserFacade {
    ParserFacade::new(rules())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncwire_core::ResultKind;

    #[test]
    fn test_chain_dispatch() {
        let parser = parser();
        let cases = [
            ("<Idle|MPos:0.000,0.000,0.000|FS:0,0>", ResultKind::Status),
            ("ok", ResultKind::Ok),
            ("error:9", ResultKind::Error),
            ("ALARM:1", ResultKind::Alarm),
            ("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]", ResultKind::ParserState),
            ("[G54:0.000,0.000,0.000]", ResultKind::Parameters),
            ("[TLO:0.000]", ResultKind::Parameters),
            ("[MSG:Caution: Unlocked]", ResultKind::Feedback),
            ("$10=1", ResultKind::Setting),
            ("Grbl 1.1h ['$' for help]", ResultKind::Startup),
            ("<Idle|MPos:x,0,0>", ResultKind::Unrecognized),
            ("okay", ResultKind::Unrecognized),
        ];

        for (line, kind) in cases {
            assert_eq!(parser.parse(line).kind(), kind, "line {:?}", line);
        }
    }
}
