//! Grbl status report parsing
//!
//! Handles both realtime report layouts:
//! - Grbl 1.1: `<Idle|MPos:0.000,0.000,0.000|FS:0,0|WCO:0.000,0.000,0.000>`
//! - Grbl 0.9: `<Idle,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000,Buf:0,RX:0>`
//!
//! Any numeric field that fails to convert rejects the whole report, so a
//! corrupted line never replaces the current status.

use crate::firmware::number;
use cncwire_core::{MachineState, MachineStatus, Position};

/// Split a report body into `key:value` fields
///
/// The separator right after the state picks the layout: `|` for 1.1,
/// `,` for 0.9. Grbl 0.9 separates fields and coordinates with the same
/// comma, so tokens without a colon belong to the previous field. Its
/// `Pin:` field may itself contain `|`.
fn split_fields(body: &str) -> Vec<String> {
    let pipe_layout = body
        .find(|c: char| c == '|' || c == ',')
        .is_some_and(|at| body[at..].starts_with('|'));
    if pipe_layout {
        return body.split('|').map(str::to_string).collect();
    }

    let mut fields: Vec<String> = Vec::new();
    for (i, token) in body.split(',').enumerate() {
        match fields.last_mut() {
            Some(field) if i > 0 && !token.contains(':') => {
                field.push(',');
                field.push_str(token);
            }
            _ => fields.push(token.to_string()),
        }
    }
    fields
}

fn parse_u32(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok()
}

fn parse_pair(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.split(',');
    let first = parts.next()?;
    let second = parts.next()?;
    parts.next().is_none().then_some((first, second))
}

/// Parse a realtime status report including its angle brackets
pub fn parse_status(line: &str) -> Option<MachineStatus> {
    let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
    let fields = split_fields(body);
    let (state_text, rest) = fields.split_first()?;
    if state_text.trim().is_empty() {
        return None;
    }

    let (state, sub_state) = MachineState::parse(state_text);
    let mut status = MachineStatus {
        state,
        sub_state,
        ..Default::default()
    };

    for field in rest {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "MPos" => status.machine_position = Some(Position::parse(value)?),
            "WPos" => status.work_position = Some(Position::parse(value)?),
            "WCO" => status.work_offset = Some(Position::parse(value)?),
            "Bf" => {
                let (planner, rx) = parse_pair(value)?;
                status.planner_buffer = Some(parse_u32(planner)?);
                status.rx_buffer = Some(parse_u32(rx)?);
            }
            "Buf" => status.planner_buffer = Some(parse_u32(value)?),
            "RX" => status.rx_buffer = Some(parse_u32(value)?),
            "F" => status.feed_rate = Some(number(value)?),
            "FS" => {
                let (feed, spindle) = parse_pair(value)?;
                status.feed_rate = Some(number(feed)?);
                status.spindle_speed = Some(number(spindle)?);
            }
            "Ov" => {
                let parts: Vec<u32> = value
                    .split(',')
                    .map(parse_u32)
                    .collect::<Option<Vec<_>>>()?;
                match parts.as_slice() {
                    [feed, rapid, spindle] => status.overrides = Some((*feed, *rapid, *spindle)),
                    _ => return None,
                }
            }
            "Pn" | "Pin" => status.pins = Some(value.to_string()),
            "Ln" => {
                parse_u32(value)?;
            }
            _ => tracing::trace!("Ignoring status field {}", key),
        }
    }

    if status.work_position.is_none() {
        if let (Some(mpos), Some(wco)) = (status.machine_position, status.work_offset) {
            status.work_position = Some(mpos.offset_by(&wco));
        }
    }

    Some(status)
}
