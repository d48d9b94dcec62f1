//! Poll and console threads around one shared session
//!
//! ```text
//!   rawhid-poll                     console-reader
//!   loop {                          loop {
//!     lock session                    read line      (no lock held)
//!     poll_once / idle sleep          lock session
//!     unlock (fair)                   execute command
//!   } until quit                    } until q / EOF  -> quit
//! ```
//!
//! The session lock is never held across the console read, so a pending read
//! never starves the poll thread. A blocked read is not interrupted on quit.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::command::{self, Flow};
use crate::console::read_command_line;
use crate::session::Session;

struct Shared {
    session: Mutex<Session>,
    quit: AtomicBool,
}

impl Shared {
    fn quitting(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

/// Handle for stopping the listener from outside its threads (Ctrl-C)
#[derive(Clone)]
pub struct QuitHandle {
    shared: Arc<Shared>,
}

impl QuitHandle {
    /// Close the device and every stream file, then stop both loops
    pub fn shutdown(&self) {
        self.shared.session.lock().shutdown();
        self.shared.quit.store(true, Ordering::SeqCst);
    }
}

/// Runs the poll and console threads until quit
pub struct Listener {
    shared: Arc<Shared>,
}

impl Listener {
    pub fn new(session: Session) -> Self {
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                quit: AtomicBool::new(false),
            }),
        }
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run both loops, reading commands from `input`, and wait for them
    ///
    /// Returns once `q` was entered, `input` reached its end, or a quit was
    /// requested through a [`QuitHandle`].
    pub fn run<R>(self, input: R) -> io::Result<()>
    where
        R: BufRead + Send + 'static,
    {
        let poll_shared = Arc::clone(&self.shared);
        let poller = thread::Builder::new()
            .name("rawhid-poll".into())
            .spawn(move || poll_loop(&poll_shared))?;

        let input_shared = Arc::clone(&self.shared);
        let reader = match thread::Builder::new()
            .name("console-reader".into())
            .spawn(move || input_loop(&input_shared, input))
        {
            Ok(reader) => reader,
            Err(e) => {
                self.quit_handle().shutdown();
                let _ = poller.join();
                return Err(e);
            }
        };

        let reader_result = reader.join();
        // A panicked reader never raised the flag
        self.shared.quit.store(true, Ordering::SeqCst);
        let poller_result = poller.join();

        if reader_result.is_err() || poller_result.is_err() {
            return Err(io::Error::other("listener thread panicked"));
        }
        info!("Listener stopped");
        Ok(())
    }
}

fn poll_loop(shared: &Shared) {
    debug!("Poll thread started");
    while !shared.quitting() {
        let mut session = shared.session.lock();
        if !session.is_open() {
            let idle = Duration::from_millis(session.config().idle_poll_ms);
            drop(session);
            thread::sleep(idle);
            continue;
        }

        if let Err(e) = session.poll_once() {
            session.report(&e);
        }
        // Hand the lock to a waiting command before polling again
        MutexGuard::unlock_fair(session);
    }
    debug!("Poll thread exiting");
}

fn input_loop<R: BufRead>(shared: &Shared, mut input: R) {
    debug!("Console thread started");
    let max_line_len = shared.session.lock().config().max_line_len;

    while !shared.quitting() {
        let line = match read_command_line(&mut input, max_line_len) {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                shared.session.lock().shutdown();
                break;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                shared.session.lock().shutdown();
                break;
            }
        };

        let flow = {
            let mut session = shared.session.lock();
            command::execute(&mut session, &line)
        };
        if flow == Flow::Quit {
            break;
        }
    }

    shared.quit.store(true, Ordering::SeqCst);
    debug!("Console thread exiting");
}
