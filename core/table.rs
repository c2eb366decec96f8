// Fixed-capacity message frequency table
use crate::protocol::truncate_output;
use crate::types::CollisionPolicy;
use std::fmt;
use std::io::{self, Write};
use std::num::NonZeroUsize;

/// Multiplicative string hash: `h = h * 31 + byte`, wrapping at 64 bits.
pub fn hash(message: &[u8]) -> u64 {
    message
        .iter()
        .fold(0u64, |h, &b| h.wrapping_mul(31).wrapping_add(u64::from(b)))
}

// count > 0 <=> message.is_some()
#[derive(Debug, Clone, Default)]
struct Slot {
    count: u64,
    message: Option<Box<[u8]>>,
}

/// Where a `record` call landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Empty bucket, now owns a copy of the message.
    Inserted { index: usize },
    /// Bucket already held the same message.
    Counted { index: usize },
    /// Bucket held a different message; its count absorbed this one.
    Merged { index: usize },
}

impl Recorded {
    pub fn index(&self) -> usize {
        match *self {
            Recorded::Inserted { index } | Recorded::Counted { index } | Recorded::Merged { index } => index,
        }
    }
}

/// Highest-count bucket, borrowed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MostCommon<'a> {
    pub count: u64,
    pub message: &'a [u8],
}

/// Message frequency counter with a fixed number of buckets.
///
/// A message goes to bucket `hash(message) % capacity`. The table is never
/// resized. With [`CollisionPolicy::Faithful`] a bucket is not checked for
/// equality: the first message to land there names it and every later message
/// hashing to the same bucket bumps its count, so the reported count for a
/// message may include occurrences of other messages.
#[derive(Debug, Clone)]
pub struct FrequencyTable {
    slots: Box<[Slot]>,
    policy: CollisionPolicy,
}

impl FrequencyTable {
    pub fn new(capacity: NonZeroUsize, policy: CollisionPolicy) -> Self {
        FrequencyTable {
            slots: vec![Slot::default(); capacity.get()].into_boxed_slice(),
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Number of buckets holding a message.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.count > 0).count()
    }

    fn home(&self, message: &[u8]) -> usize {
        (hash(message) % self.slots.len() as u64) as usize
    }

    /// Count one occurrence of `message`. Never fails.
    pub fn record(&mut self, message: &[u8]) -> Recorded {
        let home = self.home(message);
        match self.policy {
            CollisionPolicy::Faithful => self.bump(home, message),
            CollisionPolicy::Separate => {
                let capacity = self.slots.len();
                for step in 0..capacity {
                    let index = (home + step) % capacity;
                    let slot = &self.slots[index];
                    if slot.count == 0 || slot.message.as_deref() == Some(message) {
                        return self.bump(index, message);
                    }
                }
                // every bucket holds some other message
                self.bump(home, message)
            }
        }
    }

    fn bump(&mut self, index: usize, message: &[u8]) -> Recorded {
        let slot = &mut self.slots[index];
        slot.count += 1;
        match slot.message {
            None => {
                slot.message = Some(message.into());
                Recorded::Inserted { index }
            }
            Some(ref stored) if **stored == *message => Recorded::Counted { index },
            Some(_) => Recorded::Merged { index },
        }
    }

    /// Bucket with the strictly greatest count; ties go to the lowest index.
    /// `None` when nothing was ever recorded.
    pub fn most_common(&self) -> Option<MostCommon<'_>> {
        let mut best: Option<&Slot> = None;
        for slot in self.slots.iter() {
            if slot.count > best.map_or(0, |b| b.count) {
                best = Some(slot);
            }
        }
        best.and_then(|slot| {
            slot.message.as_deref().map(|message| MostCommon {
                count: slot.count,
                message,
            })
        })
    }

    pub fn report(&self) -> Report {
        Report::from(self.most_common())
    }
}

/// Shutdown summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    NoMessages,
    MostCommon { count: u64, message: Vec<u8> },
}

impl From<Option<MostCommon<'_>>> for Report {
    fn from(best: Option<MostCommon<'_>>) -> Self {
        match best {
            None => Report::NoMessages,
            Some(best) => Report::MostCommon {
                count: best.count,
                message: best.message.to_vec(),
            },
        }
    }
}

impl Report {
    /// Write the newline-terminated summary with the message bytes as
    /// received; at most 397 of them follow the arrow.
    pub fn write_line<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Report::NoMessages => out.write_all(b"No messages\n"),
            Report::MostCommon { count, message } => {
                write!(out, "{} --> ", count)?;
                out.write_all(truncate_output(message))?;
                out.write_all(b"\n")
            }
        }
    }
}

/// Lossy rendering for logs; invalid UTF-8 becomes U+FFFD.
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Report::NoMessages => write!(f, "No messages"),
            Report::MostCommon { count, message } => write!(
                f,
                "{} --> {}",
                count,
                String::from_utf8_lossy(truncate_output(message))
            ),
        }
    }
}
