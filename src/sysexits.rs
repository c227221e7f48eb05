//! legacy exit status codes for system programs.
//! reference: [SYSEXITS](https://man.freebsd.org/cgi/man.cgi?query=sysexits&apropos=0&sektion=0&manpath=FreeBSD+11.2-stable&arch=default&format=html)

use tarcel::ErrorKind;

/// value: 2 <br>
/// Misuse of shell builtins (according to Bash documentation)
pub const EX_KEYWORD: i32 = 2;

/// value: 65 <br>
/// The input data was incorrect in some way. Used for corrupt tarballs.
pub const EX_DATAERR: i32 = 65;

/// value: 66 <br>
/// An input file or remote object did not exist or was not readable.
pub const EX_NOINPUT: i32 = 66;

/// value: 69 <br>
/// A service is unavailable. Used when the remote store cannot be reached or fails.
pub const EX_UNAVAILABLE: i32 = 69;

/// value: 70 <br>
/// An internal software error has been detected.
pub const EX_SOFTWARE: i32 = 70;

/// value: 74 <br>
/// An error occurred while doing I/O on some file.
pub const EX_IOERR: i32 = 74;

/// value: 77 <br>
/// The remote store rejected the credentials or the request.
pub const EX_NOPERM: i32 = 77;

/// value: 78 <br>
/// Something was found in an unconfigured or misconfigured state.
pub const EX_CONFIG: i32 = 78;

/// Exit status for a failed operation.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(err) = err.downcast_ref::<tarcel::Error>() else {
        return EX_SOFTWARE;
    };
    match err.kind() {
        ErrorKind::Io => EX_IOERR,
        ErrorKind::Format => EX_DATAERR,
        ErrorKind::Transport => EX_UNAVAILABLE,
        ErrorKind::Auth => EX_NOPERM,
        ErrorKind::NotFound => EX_NOINPUT,
        ErrorKind::Config => EX_CONFIG,
        ErrorKind::Internal => EX_SOFTWARE,
    }
}
