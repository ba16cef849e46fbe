pub mod detector;
pub mod monitor;
pub mod state;

pub use detector::{DwellConfig, DwellDetector, DwellEvent};
pub use monitor::{DwellHandler, DwellMonitor};
pub use state::{DwellPhase, DwellState, DwellStatus};
