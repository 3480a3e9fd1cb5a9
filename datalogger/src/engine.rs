//! Mapping decoded ISP2 channels onto engine quantities
//!
//! Channels carry no identity on the wire, the Nth auxiliary reading is always
//! whatever is wired to the Nth input. The map below mirrors the harness.

use common::{
    sample::EngineGroup,
    types::units::{Afr, Fahrenheit, InHg, Mph, Psi},
};
use isp2::{DecoderStats, ProtocolFrame, StateKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelMap {
    /// In auxiliary input order
    pub aux: Vec<AuxChannel>,
    /// In wideband controller order
    pub wideband: Vec<AfrBank>,
}

/// `value = volts * gain + offset`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AuxChannel {
    pub quantity: Quantity,
    pub gain: f32,
    #[serde(default)]
    pub offset: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// F
    Coolant,
    /// psig
    OilPressure,
    /// inHg, negative is vacuum
    ManifoldPressure,
    /// mph
    VehicleSpeed,
    Unused,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AfrBank {
    Bank1,
    Bank2,
    Unused,
}

/// Engine values carried by one frame, `None` where the frame had no reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineUpdate {
    pub afr_bank1: Option<Afr>,
    pub afr_bank2: Option<Afr>,
    pub vehicle_speed: Option<Mph>,
    pub manifold_pressure: Option<InHg>,
    pub oil_pressure: Option<Psi>,
    pub coolant: Option<Fahrenheit>,
}

impl ChannelMap {
    pub fn update(&self, frame: &ProtocolFrame) -> EngineUpdate {
        let mut update = EngineUpdate::default();

        for (channel, volts) in self.aux.iter().zip(&frame.aux) {
            let value = volts * channel.gain + channel.offset;

            match channel.quantity {
                Quantity::Coolant => update.coolant = Some(Fahrenheit(value)),
                Quantity::OilPressure => update.oil_pressure = Some(Psi(value)),
                Quantity::ManifoldPressure => update.manifold_pressure = Some(InHg(value)),
                Quantity::VehicleSpeed => update.vehicle_speed = Some(Mph(value)),
                Quantity::Unused => {}
            }
        }

        for (bank, afr) in self.wideband.iter().zip(&frame.afr) {
            match bank {
                AfrBank::Bank1 => update.afr_bank1 = Some(Afr(*afr)),
                AfrBank::Bank2 => update.afr_bank2 = Some(Afr(*afr)),
                AfrBank::Unused => {}
            }
        }

        update
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            aux: vec![
                AuxChannel {
                    quantity: Quantity::Coolant,
                    gain: 100.0,
                    offset: 0.0,
                },
                AuxChannel {
                    quantity: Quantity::OilPressure,
                    gain: 25.0,
                    offset: -12.5,
                },
                AuxChannel {
                    quantity: Quantity::ManifoldPressure,
                    gain: 5.858,
                    offset: -14.696,
                },
                // 1500 mph full scale over 5V, divided down by the 12.71 gear ratio
                AuxChannel {
                    quantity: Quantity::VehicleSpeed,
                    gain: 1500.0 / 5.0 / 12.71,
                    offset: 0.0,
                },
            ],
            wideband: vec![AfrBank::Bank1, AfrBank::Bank2],
        }
    }
}

impl EngineUpdate {
    /// Only the fields present in the update are overwritten
    pub fn apply(&self, engine: &mut EngineGroup) {
        if let Some(afr) = self.afr_bank1 {
            engine.afr_bank1 = afr;
        }
        if let Some(afr) = self.afr_bank2 {
            engine.afr_bank2 = afr;
        }
        if let Some(speed) = self.vehicle_speed {
            engine.vehicle_speed = speed;
        }
        if let Some(pressure) = self.manifold_pressure {
            engine.manifold_pressure = pressure;
        }
        if let Some(pressure) = self.oil_pressure {
            engine.oil_pressure = pressure;
        }
        if let Some(temperature) = self.coolant {
            engine.coolant = temperature;
        }
    }
}

/// Decoder diagnostics published by the ISP2 thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStatus {
    pub state: StateKind,
    pub stats: DecoderStats,
}

impl Default for DecoderStatus {
    fn default() -> Self {
        Self {
            state: StateKind::SyncHigh,
            stats: DecoderStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(aux: &[f32], afr: &[f32]) -> ProtocolFrame {
        ProtocolFrame {
            aux: aux.to_vec(),
            afr: afr.to_vec(),
            aux_seen: aux.len(),
            wideband_seen: afr.len(),
        }
    }

    #[test]
    fn default_harness() {
        let update = ChannelMap::default().update(&frame(&[1.8, 2.5, 2.5, 2.5413], &[14.7, 13.2]));

        assert!((update.coolant.unwrap().0 - 180.0).abs() < 1e-3);
        assert!((update.oil_pressure.unwrap().0 - 50.0).abs() < 1e-3);
        assert!((update.manifold_pressure.unwrap().0 - (-0.051)).abs() < 1e-3);
        assert!((update.vehicle_speed.unwrap().0 - 59.98).abs() < 0.01);
        assert_eq!(update.afr_bank1, Some(Afr(14.7)));
        assert_eq!(update.afr_bank2, Some(Afr(13.2)));
    }

    #[test]
    fn only_present_channels_overwrite() {
        let mut engine = EngineGroup {
            afr_bank2: Afr(12.0),
            oil_pressure: Psi(40.0),
            ..Default::default()
        };

        // One wideband and one aux input on this frame
        ChannelMap::default()
            .update(&frame(&[2.0], &[14.0]))
            .apply(&mut engine);

        assert_eq!(engine.afr_bank1, Afr(14.0));
        assert_eq!(engine.afr_bank2, Afr(12.0));
        assert_eq!(engine.coolant, Fahrenheit(200.0));
        assert_eq!(engine.oil_pressure, Psi(40.0));
    }

    #[test]
    fn configured_map() {
        let map: ChannelMap = toml::from_str(
            r#"
            wideband = ["unused", "bank1"]

            [[aux]]
            quantity = "unused"
            gain = 1.0

            [[aux]]
            quantity = "oil_pressure"
            gain = 20.0
            offset = -10.0
            "#,
        )
        .expect("Parse");

        let update = map.update(&frame(&[3.0, 3.0], &[11.0, 15.0]));

        assert_eq!(update.coolant, None);
        assert_eq!(update.oil_pressure, Some(Psi(50.0)));
        assert_eq!(update.afr_bank1, Some(Afr(15.0)));
        assert_eq!(update.afr_bank2, None);
    }
}
