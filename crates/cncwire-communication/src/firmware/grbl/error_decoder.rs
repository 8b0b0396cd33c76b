//! Grbl error and alarm code decoder
//!
//! Maps the numeric codes of `error:N` and `ALARM:N` lines to readable
//! descriptions (Grbl 1.1 code tables).

fn error_text(code: u16) -> Option<&'static str> {
    let text = match code {
        1 => "Expected command letter. G-code words are a letter followed by a value.",
        2 => "Bad number format. A numeric value is missing or malformed.",
        3 => "Invalid statement. The '$' system command is not recognized.",
        4 => "Negative value where a positive value was expected.",
        5 => "Homing cycle is not enabled in settings.",
        6 => "Step pulse time must be at least 3 microseconds.",
        7 => "EEPROM read failed. Settings were restored to defaults.",
        8 => "'$' command requires the machine to be idle.",
        9 => "G-code is locked out while in alarm or jog state.",
        10 => "Soft limits require homing to be enabled.",
        11 => "Line exceeds the maximum line length and was not executed.",
        12 => "Setting value exceeds the maximum supported step rate.",
        13 => "Safety door opened; door state initiated.",
        14 => "Build info or startup line is too long for EEPROM.",
        15 => "Jog target exceeds machine travel; jog ignored.",
        16 => "Jog command has no '=' or contains prohibited G-code.",
        17 => "Laser mode requires PWM output.",
        20 => "Unsupported or invalid G-code command in block.",
        21 => "More than one command from the same modal group in block.",
        22 => "Feed rate has not been set.",
        23 => "Command requires an integer value.",
        24 => "More than one command in the block requires axis words.",
        25 => "Repeated G-code word in block.",
        26 => "Command requires axis words but none were found.",
        27 => "Line number is out of range (1 to 9,999,999).",
        28 => "Command is missing a required P or L word.",
        29 => "Unsupported work coordinate system. Only G54 to G59 are supported.",
        30 => "G53 requires G0 or G1 motion mode.",
        31 => "Unused axis words in block while G80 motion cancel is active.",
        32 => "Arc has no axis words in the selected plane.",
        33 => "Motion command has an invalid target.",
        34 => "Arc radius definition produced a geometry error.",
        35 => "Arc offset definition is missing an IJK word in the selected plane.",
        36 => "Block contains leftover words not used by any command.",
        37 => "G43.1 tool length offset is not assigned to the configured axis.",
        38 => "Tool number exceeds the supported maximum.",
        _ => return None,
    };
    Some(text)
}

fn alarm_text(code: u16) -> Option<&'static str> {
    let text = match code {
        1 => "Hard limit triggered. Position is likely lost; re-homing recommended.",
        2 => "Soft limit. Motion target exceeds machine travel; position retained.",
        3 => "Reset while in motion. Position may be lost; re-homing recommended.",
        4 => "Probe fail. Probe was not in the expected initial state.",
        5 => "Probe fail. Probe did not contact the workpiece within travel.",
        6 => "Homing fail. Reset during active homing cycle.",
        7 => "Homing fail. Safety door opened during homing.",
        8 => "Homing fail. Pull-off did not clear the limit switch.",
        9 => "Homing fail. Limit switch not found within search distance.",
        10 => "Homing fail. Second dual-axis limit switch not found.",
        _ => return None,
    };
    Some(text)
}

/// Decode a Grbl error code
pub fn decode_error(code: u16) -> String {
    error_text(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown error code {}", code))
}

/// Decode a Grbl alarm code
pub fn decode_alarm(code: u16) -> String {
    alarm_text(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown alarm code {}", code))
}
