use bytes::Bytes;

use crate::{Result, TsError};

/// SCTE-35 table ID
pub const SCTE35_TABLE_ID: u8 = 0xFC;

/// SCTE-35 registration format identifier
pub const SCTE35_FORMAT_IDENTIFIER: [u8; 4] = *b"CUEI";

/// SCTE-35 splice command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceCommandType {
    SpliceNull,
    SpliceSchedule,
    SpliceInsert,
    TimeSignal,
    BandwidthReservation,
    PrivateCommand,
    Unknown(u8),
}

impl From<u8> for SpliceCommandType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => SpliceCommandType::SpliceNull,
            0x04 => SpliceCommandType::SpliceSchedule,
            0x05 => SpliceCommandType::SpliceInsert,
            0x06 => SpliceCommandType::TimeSignal,
            0x07 => SpliceCommandType::BandwidthReservation,
            0xFF => SpliceCommandType::PrivateCommand,
            v => SpliceCommandType::Unknown(v),
        }
    }
}

/// Parsed splice command
#[derive(Debug, Clone)]
pub enum SpliceCommand {
    SpliceNull,
    SpliceInsert(SpliceInsert),
    TimeSignal(TimeSignal),
    Other(Vec<u8>),
}

/// SCTE-35 splice insert command
#[derive(Debug, Clone)]
pub struct SpliceInsert {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    pub splice_time: Option<u64>,
    pub duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

/// Break duration in a splice insert
#[derive(Debug, Clone, Copy)]
pub struct BreakDuration {
    pub auto_return: bool,
    /// Duration in 90kHz ticks (33-bit)
    pub duration: u64,
}

/// SCTE-35 time signal command
#[derive(Debug, Clone)]
pub struct TimeSignal {
    pub splice_time: Option<u64>,
}

/// Parse a splice_time() structure. Returns (time_value, bytes_consumed).
fn parse_splice_time(data: &[u8]) -> (Option<u64>, usize) {
    if data.is_empty() {
        return (None, 0);
    }
    let time_specified_flag = (data[0] & 0x80) != 0;
    if time_specified_flag {
        if data.len() < 5 {
            return (None, data.len());
        }
        let pts = (((data[0] as u64) & 0x01) << 32)
            | ((data[1] as u64) << 24)
            | ((data[2] as u64) << 16)
            | ((data[3] as u64) << 8)
            | (data[4] as u64);
        (Some(pts), 5)
    } else {
        (None, 1)
    }
}

/// Parse a break_duration() structure
fn parse_break_duration(data: &[u8]) -> Option<BreakDuration> {
    if data.len() < 5 {
        return None;
    }
    let auto_return = (data[0] & 0x80) != 0;
    let duration = (((data[0] as u64) & 0x01) << 32)
        | ((data[1] as u64) << 24)
        | ((data[2] as u64) << 16)
        | ((data[3] as u64) << 8)
        | (data[4] as u64);
    Some(BreakDuration {
        auto_return,
        duration,
    })
}

/// Top-level SCTE-35 splice info section (owned).
#[derive(Debug, Clone)]
pub struct SpliceInfoSection {
    pub table_id: u8,
    pub protocol_version: u8,
    pub encrypted_packet: bool,
    pub pts_adjustment: u64,
    pub splice_command_type: SpliceCommandType,
    pub splice_command: SpliceCommand,
}

impl SpliceInfoSection {
    /// Parse a SCTE-35 splice info section from PSI section data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 14 {
            return Err(TsError::InsufficientData {
                expected: 14,
                actual: data.len(),
            });
        }

        let table_id = data[0];
        if table_id != SCTE35_TABLE_ID {
            return Err(TsError::InvalidTableId {
                expected: SCTE35_TABLE_ID,
                actual: table_id,
            });
        }

        let _section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;
        let protocol_version = data[3];
        let encrypted_packet = (data[4] & 0x80) != 0;

        // pts_adjustment is 33 bits starting at bit 6 of byte 4
        let pts_adjustment = (((data[4] as u64) & 0x01) << 32)
            | ((data[5] as u64) << 24)
            | ((data[6] as u64) << 16)
            | ((data[7] as u64) << 8)
            | (data[8] as u64);

        // cw_index at byte 9
        // tier at bytes 10-11 (12 bits)
        let splice_command_length = ((data[11] as u16 & 0x0F) << 8) | data[12] as u16;
        let splice_command_type = SpliceCommandType::from(data[13]);

        let cmd_start = 14;
        let cmd_end = if splice_command_length == 0xFFF {
            // Unknown length â€” use rest of section minus CRC
            data.len().saturating_sub(4)
        } else {
            (cmd_start + splice_command_length as usize).min(data.len())
        };

        let cmd_data = if cmd_start < cmd_end {
            &data[cmd_start..cmd_end]
        } else {
            &[]
        };

        let splice_command = match splice_command_type {
            SpliceCommandType::SpliceNull => SpliceCommand::SpliceNull,
            SpliceCommandType::SpliceInsert => match Self::parse_splice_insert(cmd_data) {
                Ok(insert) => SpliceCommand::SpliceInsert(insert),
                Err(_) => SpliceCommand::Other(cmd_data.to_vec()),
            },
            SpliceCommandType::TimeSignal => {
                let (splice_time, _) = parse_splice_time(cmd_data);
                SpliceCommand::TimeSignal(TimeSignal { splice_time })
            }
            _ => SpliceCommand::Other(cmd_data.to_vec()),
        };

        Ok(SpliceInfoSection {
            table_id,
            protocol_version,
            encrypted_packet,
            pts_adjustment,
            splice_command_type,
            splice_command,
        })
    }

    fn parse_splice_insert(data: &[u8]) -> Result<SpliceInsert> {
        if data.len() < 5 {
            return Err(TsError::InvalidScte35(
                "splice_insert too short".to_string(),
            ));
        }

        let splice_event_id = ((data[0] as u32) << 24)
            | ((data[1] as u32) << 16)
            | ((data[2] as u32) << 8)
            | (data[3] as u32);
        let splice_event_cancel_indicator = (data[4] & 0x80) != 0;

        if splice_event_cancel_indicator {
            return Ok(SpliceInsert {
                splice_event_id,
                splice_event_cancel_indicator: true,
                out_of_network_indicator: false,
                program_splice_flag: false,
                splice_immediate_flag: false,
                splice_time: None,
                duration: None,
                unique_program_id: 0,
                avail_num: 0,
                avails_expected: 0,
            });
        }

        if data.len() < 6 {
            return Err(TsError::InvalidScte35(
                "splice_insert missing flags".to_string(),
            ));
        }

        let flags = data[5];
        let out_of_network_indicator = (flags & 0x80) != 0;
        let program_splice_flag = (flags & 0x40) != 0;
        let duration_flag = (flags & 0x20) != 0;
        let splice_immediate_flag = (flags & 0x10) != 0;

        let mut offset = 6;
        let mut splice_time = None;

        if program_splice_flag && !splice_immediate_flag {
            let (time, consumed) = parse_splice_time(&data[offset..]);
            splice_time = time;
            offset += consumed;
        }

        let duration = if duration_flag && offset + 5 <= data.len() {
            let bd = parse_break_duration(&data[offset..]);
            offset += 5;
            bd
        } else {
            None
        };

        let (unique_program_id, avail_num, avails_expected) = if offset + 4 <= data.len() {
            let upid = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
            let an = data[offset + 2];
            let ae = data[offset + 3];
            (upid, an, ae)
        } else {
            (0, 0, 0)
        };

        Ok(SpliceInsert {
            splice_event_id,
            splice_event_cancel_indicator: false,
            out_of_network_indicator,
            program_splice_flag,
            splice_immediate_flag,
            splice_time,
            duration,
            unique_program_id,
            avail_num,
            avails_expected,
        })
    }
}

/// Zero-copy SCTE-35 splice info section reference.
#[derive(Debug, Clone)]
pub struct SpliceInfoSectionRef {
    #[allow(dead_code)]
    data: Bytes,
    pub inner: SpliceInfoSection,
}

impl SpliceInfoSectionRef {
    /// Parse from Bytes.
    pub fn parse(data: Bytes) -> Result<Self> {
        let inner = SpliceInfoSection::parse(&data)?;
        Ok(SpliceInfoSectionRef { data, inner })
    }
}
