//! Simulated settlement feed
//!
//! Each poll either resolves an open position or moves its price. Outcome
//! tokens resolve to 1.0 or 0.0 with the token's entry price (plus a
//! configurable edge) as the chance of paying out; DEX positions exit at
//! their current drifted price.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{Outcome, Position, Venue};
use crate::ports::{SettlementError, SettlementEvent, SettlementPort};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Chance per poll that a position settles
    pub resolve_probability: f64,
    /// Added to the implied probability when resolving outcome tokens
    pub edge: f64,
    /// Max relative price move per poll
    pub volatility: f64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            resolve_probability: 0.25,
            edge: 0.03,
            volatility: 0.08,
        }
    }
}

#[derive(Debug)]
pub struct SimulatedSettlement {
    config: SettlementConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedSettlement {
    pub fn new(config: SettlementConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn drift(&self, rng: &mut StdRng, position: &Position) -> f64 {
        let vol = self.config.volatility;
        let step = if vol > 0.0 { rng.gen_range(-vol..vol) } else { 0.0 };
        let price = position.last_price * (1.0 + step);
        match position.venue {
            Venue::PredictionMarket => price.clamp(0.01, 0.99),
            Venue::DexToken => price.max(f64::MIN_POSITIVE),
        }
    }
}

#[async_trait]
impl SettlementPort for SimulatedSettlement {
    async fn poll(&self, open_positions: &[Position]) -> Result<Vec<SettlementEvent>, SettlementError> {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let events = open_positions
            .iter()
            .filter(|p| p.is_open())
            .map(|position| {
                let position_id = position.id.clone();
                if !rng.gen_bool(self.config.resolve_probability.clamp(0.0, 1.0)) {
                    let price = self.drift(&mut rng, position);
                    return SettlementEvent::Price { position_id, price };
                }

                let exit_price = match position.venue {
                    Venue::PredictionMarket => {
                        let p_win = (position.entry_price + self.config.edge).clamp(0.0, 1.0);
                        if rng.gen_bool(p_win) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    Venue::DexToken => self.drift(&mut rng, position),
                };
                SettlementEvent::Resolved {
                    position_id,
                    outcome: Outcome::Settled { exit_price },
                }
            })
            .collect();

        Ok(events)
    }
}
