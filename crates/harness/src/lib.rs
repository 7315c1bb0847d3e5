pub mod authority;
pub mod device;
pub mod probe;

pub use authority::FakeAuthority;
pub use device::TestDevice;
pub use probe::FakeProbe;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer. Honors `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
