//! Access Trace Parser.
//!
//! A trace is a line-oriented text file, one operation per line:
//!
//! ```text
//! # handle address size type_id
//! alloc 1 4096 64 3
//! read 0 1 0          # lane handle offset
//! write 1 1 0 42      # lane handle offset value
//! read 0 1 length     # array length of handle 1
//! prefetch 0 1 16
//! flush 0
//! tick 4
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hex. `length` and `typeid` stand for the two
//! sentinel offsets.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::common::{ARRAY_LENGTH_OFFSET, LaneId, ObjAddr, TYPE_ID_OFFSET, Word};
use crate::memory::HtEntry;

/// Errors raised while reading a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The file could not be read.
    #[error("cannot read trace {}: {source}", path.display())]
    Io {
        /// Trace file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The first word of a line is not a known command.
    #[error("line {line}: unknown command `{command}`")]
    UnknownCommand {
        /// 1-based line number.
        line: usize,
        /// Offending word.
        command: String,
    },

    /// A command has the wrong number of arguments.
    #[error("line {line}: `{command}` expects {expected} argument(s), found {found}")]
    Arity {
        /// 1-based line number.
        line: usize,
        /// Command name.
        command: &'static str,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        found: usize,
    },

    /// An argument is not a number.
    #[error("line {line}: invalid number `{token}`")]
    Number {
        /// 1-based line number.
        line: usize,
        /// Offending token.
        token: String,
    },
}

/// One trace operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceOp {
    /// Register a handle.
    Alloc {
        /// Handle to register.
        handle: u32,
        /// Its metadata.
        entry: HtEntry,
    },
    /// Demand read.
    Read {
        /// Issuing lane.
        lane: LaneId,
        /// Address read.
        addr: ObjAddr,
    },
    /// Demand write.
    Write {
        /// Issuing lane.
        lane: LaneId,
        /// Address written.
        addr: ObjAddr,
        /// Value written.
        value: Word,
    },
    /// Explicit prefetch.
    Prefetch {
        /// Issuing lane.
        lane: LaneId,
        /// Address to prefetch.
        addr: ObjAddr,
    },
    /// Flush one lane.
    Flush {
        /// Lane to flush.
        lane: LaneId,
    },
    /// Service queued prefetches.
    Tick {
        /// Number of requests to service.
        cycles: u32,
    },
}

impl TraceOp {
    /// Returns `true` for demand reads and writes.
    #[inline]
    pub const fn is_access(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }
}

fn number<T>(token: &str, line: usize) -> Result<T, TraceError>
where
    T: TryFrom<i64>,
{
    let parsed = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<i64>().ok()
    };
    parsed
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| TraceError::Number {
            line,
            token: token.to_string(),
        })
}

fn offset(token: &str, line: usize) -> Result<u32, TraceError> {
    match token {
        "length" => Ok(ARRAY_LENGTH_OFFSET),
        "typeid" => Ok(TYPE_ID_OFFSET),
        _ => number(token, line),
    }
}

fn arity(
    args: &[&str],
    expected: usize,
    command: &'static str,
    line: usize,
) -> Result<(), TraceError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TraceError::Arity {
            line,
            command,
            expected,
            found: args.len(),
        })
    }
}

fn parse_line(text: &str, line: usize) -> Result<Option<TraceOp>, TraceError> {
    let text = text.split('#').next().unwrap_or_default().trim();
    let mut words = text.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let op = match command {
        "alloc" => {
            arity(&args, 4, "alloc", line)?;
            TraceOp::Alloc {
                handle: number(args[0], line)?,
                entry: HtEntry::new(
                    number(args[1], line)?,
                    number(args[2], line)?,
                    number(args[3], line)?,
                ),
            }
        }
        "read" => {
            arity(&args, 3, "read", line)?;
            TraceOp::Read {
                lane: number(args[0], line)?,
                addr: ObjAddr::new(number(args[1], line)?, offset(args[2], line)?),
            }
        }
        "write" => {
            arity(&args, 4, "write", line)?;
            TraceOp::Write {
                lane: number(args[0], line)?,
                addr: ObjAddr::new(number(args[1], line)?, offset(args[2], line)?),
                value: number(args[3], line)?,
            }
        }
        "prefetch" => {
            arity(&args, 3, "prefetch", line)?;
            TraceOp::Prefetch {
                lane: number(args[0], line)?,
                addr: ObjAddr::new(number(args[1], line)?, offset(args[2], line)?),
            }
        }
        "flush" => {
            arity(&args, 1, "flush", line)?;
            TraceOp::Flush {
                lane: number(args[0], line)?,
            }
        }
        "tick" => match args.as_slice() {
            [] => TraceOp::Tick { cycles: 1 },
            [n] => TraceOp::Tick {
                cycles: number(n, line)?,
            },
            _ => {
                return Err(TraceError::Arity {
                    line,
                    command: "tick",
                    expected: 1,
                    found: args.len(),
                });
            }
        },
        other => {
            return Err(TraceError::UnknownCommand {
                line,
                command: other.to_string(),
            });
        }
    };
    Ok(Some(op))
}

/// Parses a whole trace. Blank lines and `#` comments are skipped.
///
/// # Errors
///
/// The first malformed line.
pub fn parse(text: &str) -> Result<Vec<TraceOp>, TraceError> {
    let mut ops = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(op) = parse_line(line, i + 1)? {
            ops.push(op);
        }
    }
    Ok(ops)
}

/// Reads and parses a trace file.
///
/// # Errors
///
/// `TraceError::Io` if the file cannot be read, or the first malformed line.
pub fn load(path: &Path) -> Result<Vec<TraceOp>, TraceError> {
    let text = fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}
