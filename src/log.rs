use env_logger::Builder;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the process-wide logger once. Safe to call from every CLI
/// entry point and from test setup; later calls are no-ops.
pub fn init_log() {
    INIT.call_once(|| {
        let mut builder = Builder::from_default_env();
        builder
            .format_timestamp_micros()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}
