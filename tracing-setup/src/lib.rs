use std::{panic, thread};

/// Initializes tracing setup that is shared between the binaries.
/// `env_filter` has similar syntax to env_logger. It is documented at
/// https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html
pub fn initialize(env_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
    set_panic_hook();
}

// Sets a panic hook so panic information is logged in addition to the default panic printer.
fn set_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");
        // It is not possible for our custom hook to print a full backtrace on stable rust. To not
        // lose this information we call the default panic handler which prints the full backtrace.
        tracing::error!("thread '{}' {}:", thread_name, info);
        default_hook(info);
    }));
}
