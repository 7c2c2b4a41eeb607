use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apoxcan_session::{Dispatcher, Event};
use tracing::warn;

use crate::cmd::{close, MonitorArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_event, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let session = args.device.open()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut printer = Printer {
        format,
        board: args.board,
        remaining: args.count,
    };

    while running.load(Ordering::SeqCst) && !printer.done() {
        if !session.is_ingesting() {
            // Pick up whatever the ingestion thread queued before it stopped.
            printer.drain(session.dispatcher());
            close(session)?;
            return Err(CliError::new(TRANSPORT_ERROR, "adapter disconnected"));
        }
        printer.poll(session.dispatcher(), POLL_INTERVAL);
    }

    close(session)?;
    Ok(SUCCESS)
}

/// Prints events until the requested number of messages has been shown.
struct Printer {
    format: OutputFormat,
    board: bool,
    remaining: Option<usize>,
}

impl Printer {
    fn done(&self) -> bool {
        self.remaining == Some(0)
    }

    fn poll(&mut self, dispatcher: &Dispatcher, timeout: Duration) {
        dispatcher.poll(timeout, &mut |event: Event| self.handle(event));
    }

    fn drain(&mut self, dispatcher: &Dispatcher) {
        dispatcher.dispatch(&mut |event: Event| self.handle(event));
    }

    fn handle(&mut self, event: Event) {
        if self.done() {
            return;
        }
        match &event {
            Event::Error(error) => {
                warn!(source = ?error.source, byte = ?error.byte, "{}", error.message);
                print_event(&event, self.format);
            }
            Event::Board(_) if !self.board => {}
            Event::Board(_) | Event::CanBus(_) => {
                print_event(&event, self.format);
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
            }
        }
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
