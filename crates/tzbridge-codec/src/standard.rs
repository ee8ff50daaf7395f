//! Standard dialect - capability writes as cluster commands
//!
//! Devices speaking the standard dialect are addressed per cluster. A
//! capability write maps straight onto a command (or an attribute write);
//! no datapoint encoding is involved. Payload fields are little-endian.

use tracing::debug;
use tzbridge_core::CapabilityValue;

use crate::datapoint::CodecError;
use crate::frame::{FrameWriter, OutboundFrame, ZclHeader, FC_CLUSTER_SPECIFIC, FC_GLOBAL};

pub const CLUSTER_ON_OFF: u16 = 0x0006;
pub const CLUSTER_LEVEL_CONTROL: u16 = 0x0008;
pub const CLUSTER_WINDOW_COVERING: u16 = 0x0102;
pub const CLUSTER_THERMOSTAT: u16 = 0x0201;

/// Global command id for attribute writes
const CMD_WRITE_ATTRIBUTES: u8 = 0x02;
/// Thermostat occupied heating setpoint, centi-degrees
const ATTR_OCCUPIED_HEATING_SETPOINT: u16 = 0x0012;
const TYPE_INT16: u8 = 0x29;

/// Capabilities that have a standard command
pub const STANDARD_CAPABILITIES: &[&str] = &[
    "onoff",
    "dim",
    "windowcoverings_set",
    "windowcoverings_tilt_set",
    "windowcoverings_state",
    "target_temperature",
];

/// A standard cluster command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardCommand {
    Off,
    On,
    MoveToLevelWithOnOff { level: u8, transition: u16 },
    UpOpen,
    DownClose,
    Stop,
    GoToLiftPercentage(u8),
    GoToTiltPercentage(u8),
    WriteHeatingSetpoint(i16),
}

impl StandardCommand {
    pub fn cluster(&self) -> u16 {
        match self {
            Self::Off | Self::On => CLUSTER_ON_OFF,
            Self::MoveToLevelWithOnOff { .. } => CLUSTER_LEVEL_CONTROL,
            Self::UpOpen
            | Self::DownClose
            | Self::Stop
            | Self::GoToLiftPercentage(_)
            | Self::GoToTiltPercentage(_) => CLUSTER_WINDOW_COVERING,
            Self::WriteHeatingSetpoint(_) => CLUSTER_THERMOSTAT,
        }
    }

    pub fn command_id(&self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::On => 0x01,
            Self::MoveToLevelWithOnOff { .. } => 0x04,
            Self::UpOpen => 0x00,
            Self::DownClose => 0x01,
            Self::Stop => 0x02,
            Self::GoToLiftPercentage(_) => 0x05,
            Self::GoToTiltPercentage(_) => 0x08,
            Self::WriteHeatingSetpoint(_) => CMD_WRITE_ATTRIBUTES,
        }
    }

    /// Attribute writes are profile-wide commands, the rest are cluster specific
    pub fn is_global(&self) -> bool {
        matches!(self, Self::WriteHeatingSetpoint(_))
    }

    fn write_payload(&self, w: &mut FrameWriter) -> Result<(), CodecError> {
        match *self {
            Self::MoveToLevelWithOnOff { level, transition } => {
                w.put_u8(level)?.put_u16_le(transition)?;
            }
            Self::GoToLiftPercentage(pct) | Self::GoToTiltPercentage(pct) => {
                w.put_u8(pct)?;
            }
            Self::WriteHeatingSetpoint(centi) => {
                w.put_u16_le(ATTR_OCCUPIED_HEATING_SETPOINT)?
                    .put_u8(TYPE_INT16)?
                    .put_i16_le(centi)?;
            }
            Self::Off | Self::On | Self::UpOpen | Self::DownClose | Self::Stop => {}
        }
        Ok(())
    }

    /// Serialize into a frame addressed to the command's cluster
    pub fn to_frame(&self, seq: u8) -> Result<OutboundFrame, CodecError> {
        let mut w = FrameWriter::new();
        ZclHeader {
            frame_control: if self.is_global() { FC_GLOBAL } else { FC_CLUSTER_SPECIFIC },
            seq,
            command_id: self.command_id(),
        }
        .write_to(&mut w)?;
        self.write_payload(&mut w)?;
        Ok(OutboundFrame {
            cluster: self.cluster(),
            bytes: w.finish(),
        })
    }
}

/// Whether a capability can be written in the standard dialect
pub fn has_standard_command(capability: &str) -> bool {
    STANDARD_CAPABILITIES.contains(&capability)
}

/// Map a capability write onto its standard command
pub fn standard_command(
    capability: &str,
    value: &CapabilityValue,
) -> Result<StandardCommand, CodecError> {
    let invalid = || CodecError::InvalidValue {
        capability: capability.to_string(),
        value: value.to_string(),
    };
    let number = || value.as_f64().filter(|n| n.is_finite()).ok_or_else(invalid);
    // Covering percentages count closure, the capability counts openness
    let closure_pct = |v: f64| ((1.0 - v.clamp(0.0, 1.0)) * 100.0).round() as u8;

    let command = match capability {
        "onoff" => {
            if value.as_bool().ok_or_else(invalid)? {
                StandardCommand::On
            } else {
                StandardCommand::Off
            }
        }
        "dim" => StandardCommand::MoveToLevelWithOnOff {
            level: (number()?.clamp(0.0, 1.0) * 254.0).round() as u8,
            transition: 0,
        },
        "windowcoverings_set" => StandardCommand::GoToLiftPercentage(closure_pct(number()?)),
        "windowcoverings_tilt_set" => StandardCommand::GoToTiltPercentage(closure_pct(number()?)),
        "windowcoverings_state" => match value.as_str().ok_or_else(invalid)? {
            "up" => StandardCommand::UpOpen,
            "down" => StandardCommand::DownClose,
            "idle" | "stop" => StandardCommand::Stop,
            _ => return Err(invalid()),
        },
        "target_temperature" => {
            let centi = (number()? * 100.0).round().clamp(i16::MIN as f64, i16::MAX as f64);
            StandardCommand::WriteHeatingSetpoint(centi as i16)
        }
        _ => return Err(CodecError::EncodeTargetMissing(capability.to_string())),
    };

    debug!(capability = %capability, command = ?command, "Mapped standard command");
    Ok(command)
}
