//! Streaming configuration surface (§6), realised as a `serde`-deserialised
//! struct tree instead of the dotted-path strings FFADO's control layer
//! uses internally. Grounded on the teacher's `bark::config` module, which
//! loads a `serde`-derived struct from an optional TOML file and overlays
//! environment variables; see `ffado-streamd::config` for the loader.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub common: CommonConfig,
    pub amdtp: AmdtpConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            common: CommonConfig::default(),
            amdtp: AmdtpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    /// Receive-side DLL bandwidth, in Hz.
    pub recv_sp_dll_bw: f32,
    /// Transmit-side DLL bandwidth, in Hz.
    pub xmit_sp_dll_bw: f32,
    /// Ring buffer capacity, in periods. Must be >= 3.
    pub nb_buffers: u32,
    /// Frames transferred to/from the client per wakeup.
    pub period: u32,
}

impl Default for CommonConfig {
    fn default() -> Self {
        CommonConfig {
            recv_sp_dll_bw: 0.01,
            xmit_sp_dll_bw: 0.01,
            nb_buffers: 3,
            period: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmdtpConfig {
    /// How many cycles before the presentation deadline a packet may be
    /// sent without being considered "early".
    pub xmit_max_cycles_early_transmit: u32,
    /// Fixed transport delay, in ticks, added between presentation time
    /// and the earliest legal transmit time.
    pub xmit_transfer_delay: u32,
    /// Minimum safety margin, in cycles, that must remain before the
    /// presentation deadline for a packet to still be sendable.
    pub xmit_min_cycles_before_presentation: u32,
}

impl Default for AmdtpConfig {
    fn default() -> Self {
        AmdtpConfig {
            xmit_max_cycles_early_transmit: 2,
            xmit_transfer_delay: 11 * crate::TICKS_PER_CYCLE,
            xmit_min_cycles_before_presentation: 1,
        }
    }
}

impl CommonConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.nb_buffers < 3 {
            return Err("common.nb_buffers must be >= 3");
        }
        if self.period == 0 {
            return Err("common.period must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let cfg = StreamingConfig::default();
        assert!(cfg.common.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let parsed: StreamingConfig = toml::from_str(r#"
            [common]
            period = 256
        "#).unwrap();

        assert_eq!(parsed.common.period, 256);
        assert_eq!(parsed.common.nb_buffers, CommonConfig::default().nb_buffers);
    }
}
