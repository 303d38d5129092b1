//! Process-wide panic hook: logs via `tracing` instead of letting the
//! default hook's stderr write race with structured log output.

pub fn register_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let payload = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        let bt = std::backtrace::Backtrace::force_capture();
        if let Some(loc) = info.location() {
            tracing::error!(file = loc.file(), line = loc.line(), %payload, "panic\n{bt}");
        } else {
            tracing::error!(%payload, "panic\n{bt}");
        }
        default_hook(info);
    }));
}
