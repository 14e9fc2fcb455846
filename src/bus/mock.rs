//! A mock lock-in amplifier that generates synthetic readings.
//!
//! Answers the magnitude queries with a slowly drifting waveform so the
//! full pipeline (including plots) can run without hardware. Tests can
//! queue exact replies or injected faults ahead of the synthetic ones.

use super::Bus;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;

/// Scripted reply for tests: either a raw response string or a simulated
/// bus fault.
type ScriptedReply = Result<String, String>;

pub struct MockLockin {
    src_v: f64,
    ch1_base_v: f64,
    ch2_base_v: f64,
    phase: f64,
    scripted: VecDeque<ScriptedReply>,
    commands: Vec<String>,
}

impl Default for MockLockin {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLockin {
    pub fn new() -> Self {
        // Random starting phase so repeated runs do not trace the same
        // curve; everything after construction is deterministic.
        let phase = rand::thread_rng().gen_range(0.0..std::f64::consts::TAU);
        Self {
            src_v: 1.0,
            ch1_base_v: 0.1,
            ch2_base_v: 0.01,
            phase,
            scripted: VecDeque::new(),
            commands: Vec::new(),
        }
    }

    /// Fix the waveform phase (tests).
    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    /// Set the reported oscillator amplitude in volts.
    pub fn with_src_v(mut self, src_v: f64) -> Self {
        self.src_v = src_v;
        self
    }

    /// Set the channel baselines in volts.
    pub fn with_channel_baselines(mut self, ch1_v: f64, ch2_v: f64) -> Self {
        self.ch1_base_v = ch1_v;
        self.ch2_base_v = ch2_v;
        self
    }

    /// Queue a raw response, consumed before synthetic replies.
    pub fn push_response(&mut self, response: &str) {
        self.scripted.push_back(Ok(response.to_string()));
    }

    /// Queue a simulated bus fault.
    pub fn push_error(&mut self, message: &str) {
        self.scripted.push_back(Err(message.to_string()));
    }

    /// Commands issued so far, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    fn synthetic_reply(&mut self, command: &str) -> Result<String> {
        let value = match command {
            "OA." => self.src_v,
            "MAG1." => {
                self.phase += 0.1;
                // Deterministic jitter for a fixed starting phase.
                let noise = (self.phase * 37.0).sin() * 0.005;
                self.ch1_base_v * (1.0 + 0.02 * self.phase.sin() + noise)
            }
            "MAG2." => {
                let noise = (self.phase * 37.0).sin() * 0.004;
                self.ch2_base_v * (1.0 + 0.02 * self.phase.cos() + noise)
            }
            other => return Err(anyhow!("Mock lock-in does not recognize '{}'", other)),
        };
        Ok(format!("{:.6E}", value))
    }
}

#[async_trait]
impl Bus for MockLockin {
    async fn query(&mut self, command: &str) -> Result<String> {
        self.commands.push(command.to_string());
        if let Some(reply) = self.scripted.pop_front() {
            return reply.map_err(|message| anyhow!(message));
        }
        self.synthetic_reply(command)
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.commands.push(command.to_string());
        Ok(())
    }
}
