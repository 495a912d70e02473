//! MS power-command tables (GSM 05.05 4.1.1).

use serde::Deserialize;

/// Operating band, selects the power-command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Gsm400,
    Gsm850,
    Egsm900,
    Dcs1800,
    Pcs1900,
}

/// Power control codes for GSM400, GSM850, EGSM900.
static POWER_COMMAND_LOW_BAND: [i32; 32] = [
    39, 39, 39, 37, // 0-3
    35, 33, 31, 29, // 4-7
    27, 25, 23, 21, // 8-11
    19, 17, 15, 13, // 12-15
    11, 9, 7, 5, // 16-19
    5, 5, 5, 5, // 20-23
    5, 5, 5, 5, // 24-27
    5, 5, 5, 5, // 28-31
];

/// Power control codes for DCS1800.
static POWER_COMMAND_1800: [i32; 32] = [
    30, 28, 26, 24, // 0-3
    22, 20, 18, 16, // 4-7
    14, 12, 10, 8, // 8-11
    6, 4, 2, 0, // 12-15
    0, 0, 0, 0, // 16-19
    0, 0, 0, 0, // 20-23
    0, 0, 0, 0, // 24-27
    0, 36, 24, 23, // 28-31
];

/// Power control codes for PCS1900.
static POWER_COMMAND_1900: [i32; 32] = [
    30, 28, 26, 24, // 0-3
    22, 20, 18, 16, // 4-7
    14, 12, 10, 8, // 8-11
    6, 4, 2, 0, // 12-15
    0, 0, 0, 0, // 16-19
    0, 0, 0, 0, // 20-23
    0, 0, 0, 0, // 24-27
    0, 0, 0, 0, // 28-31
];

fn pick_table(band: Band) -> &'static [i32; 32] {
    match band {
        Band::Gsm400 | Band::Gsm850 | Band::Egsm900 => &POWER_COMMAND_LOW_BAND,
        Band::Dcs1800 => &POWER_COMMAND_1800,
        Band::Pcs1900 => &POWER_COMMAND_1900,
    }
}

/// Commanded MS power in dBm for a 5-bit power control code.
pub fn decode_power(band: Band, code: u8) -> i32 {
    pick_table(band)[code as usize & 0x1f]
}

/// Encode a power level in dBm as the closest control code.
/// An exact match returns immediately; ties go to the lowest code.
pub fn encode_power(band: Band, power: i32) -> u8 {
    let table = pick_table(band);
    let mut min_err = (power - table[0]).unsigned_abs();
    let mut code = 0u8;
    for i in 1..32 {
        let this_err = (power - table[i]).unsigned_abs();
        if this_err == 0 {
            return i as u8;
        }
        if this_err < min_err {
            min_err = this_err;
            code = i as u8;
        }
    }
    code
}
