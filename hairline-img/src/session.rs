use crate::catalog::HairstyleId;
use anyhow::{Error, bail};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Face scan: outline, guides and pose readout.
    #[default]
    Calibration,
    /// Hair sprite over the live feed.
    TryOn,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calibration" => Ok(Mode::Calibration),
            "try-on" => Ok(Mode::TryOn),
            other => bail!("unknown mode {other:?}, expected calibration or try-on"),
        }
    }
}

/// What the surrounding UI wants drawn. Published over a watch channel and
/// read once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub mode: Mode,
    pub selected: Option<HairstyleId>,
}

impl SessionState {
    pub fn try_on(selected: HairstyleId) -> Self {
        Self {
            mode: Mode::TryOn,
            selected: Some(selected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!("try-on".parse::<Mode>().unwrap(), Mode::TryOn);
        assert_eq!("calibration".parse::<Mode>().unwrap(), Mode::Calibration);
        assert!("tryon".parse::<Mode>().is_err());
    }

    #[test]
    fn test_default_is_calibration_without_selection() {
        let state = SessionState::default();
        assert_eq!(state.mode, Mode::Calibration);
        assert_eq!(state.selected, None);
        assert_eq!(SessionState::try_on(4).selected, Some(4));
    }
}
