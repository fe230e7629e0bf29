//! Terminal geometry for the remote PTY request.
//!
//! When the gateway runs attached to an interactive terminal its current size
//! is used; otherwise (daemon, container, service manager) the configured
//! default applies. The size is a hint only.

use std::mem::MaybeUninit;

use nix::pty::Winsize;

/// Width and height in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u32,
    pub rows: u32,
}

impl TerminalSize {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

/// Size of the local terminal on stdin, or `fallback` if there is none.
pub fn resolve(fallback: TerminalSize) -> TerminalSize {
    query_stdin().unwrap_or(fallback)
}

fn query_stdin() -> Option<TerminalSize> {
    // SAFETY: isatty only inspects the descriptor.
    if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
        return None;
    }
    let mut winsize = MaybeUninit::<Winsize>::zeroed();
    // SAFETY: TIOCGWINSZ writes a Winsize struct into the provided pointer.
    let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, winsize.as_mut_ptr()) };
    if ret == -1 {
        return None;
    }
    // SAFETY: zero-initialised and filled in by a successful ioctl.
    let winsize = unsafe { winsize.assume_init() };
    from_winsize(&winsize)
}

fn from_winsize(ws: &Winsize) -> Option<TerminalSize> {
    if ws.ws_col == 0 || ws.ws_row == 0 {
        return None;
    }
    Some(TerminalSize::new(u32::from(ws.ws_col), u32::from(ws.ws_row)))
}
