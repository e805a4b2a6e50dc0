mod device;
mod envelope;
mod reading;
mod result;
mod session;

pub use device::*;
pub use envelope::*;
pub use reading::*;
pub use result::*;
pub use session::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use reading::MockSensorProvider;
#[cfg(any(test, feature = "testing"))]
pub use session::MockSessionOpener;
#[cfg(any(test, feature = "testing"))]
pub use session::MockTelemetrySession;
