//! Static help shown for `help.models` and `help.grids`.

use crate::params::{keys, ParameterSet};

pub const MODELS_HELP: &str = "\
Default models (select with DEFAULT_MODEL, or RUN_i for ensemble runs):
  flat                      constant default model
  gaussian                  centered Gaussian; SIGMA
  shifted gaussian          Gaussian at +SHIFT; SIGMA, SHIFT
  double gaussian           symmetric Gaussians at +/-SHIFT; SIGMA, SHIFT
  two gaussians             independent Gaussians; SIGMA1, SIGMA2, SHIFT1, SHIFT2, NORM1
  general double gaussian   asymmetric pair; SIGMA, SHIFT, BOSE_NORM
  linear rise exp decay     omega * exp(-LAMBDA * omega); LAMBDA
  quadratic rise exp decay  omega^2 * exp(-LAMBDA * omega); LAMBDA
  lorentzian                centered Lorentzian; GAMMA
  two lorentzians           Lorentzians at +/-SHIFT; GAMMA, SHIFT
  <file name>               tabulated model read from a two-column file (omega, value)";

pub const GRIDS_HELP: &str = "\
Frequency grids (select with FREQUENCY_GRID, size NFREQ, range OMEGA_MAX):
  Lorentzian       points clustered around omega = 0; CUT
  half Lorentzian  Lorentzian on the positive axis only; CUT
  quadratic        quadratic spacing; SPREAD
  log              logarithmic spacing from LOG_MIN
  linear           evenly spaced points";

/// Text for every help switch set in `params`, or `None` when none is set.
pub fn requested_help(params: &ParameterSet) -> Option<String> {
    let mut sections = Vec::new();
    if params.flag(keys::HELP_MODELS) {
        sections.push(MODELS_HELP);
    }
    if params.flag(keys::HELP_GRIDS) {
        sections.push(GRIDS_HELP);
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}
