//! Stage legality table
//!
//! Rows are the previously accepted kind, columns the incoming kind, both
//! indexed by wire value. Every exception to plain forward progress is a
//! visible cell:
//!
//! * the `AlivePing` column is all `T` (liveness is out-of-band);
//! * the `ExtractedArchiveWithProgress` diagonal cell is `T` (progress repeats);
//! * the `ArchiveExtractionFailed` column is `T` only after extraction began;
//! * the `ArchiveExtractionFailed` row is terminal apart from pings.
//!
//! A fresh restart after a failure is a new session, not a transition.

use crate::protocol::InstallerMessageKind;

const T: bool = true;
const F: bool = false;

const KIND_COUNT: usize = InstallerMessageKind::ALL.len();

#[rustfmt::skip]
static TRANSITIONS: [[bool; KIND_COUNT]; KIND_COUNT] = [
    //  NS ES EP AF VS S1 F1 F2 F3 PI     previous
    [   F, T, T, F, T, T, T, T, T, T ], // NotStarted
    [   F, F, T, T, T, T, T, T, T, T ], // ExtractionStarted
    [   F, F, T, T, T, T, T, T, T, T ], // ExtractedArchiveWithProgress
    [   F, F, F, F, F, F, F, F, F, T ], // ArchiveExtractionFailed
    [   F, F, F, F, F, T, T, T, T, T ], // ValidationStarted
    [   F, F, F, F, F, F, T, T, T, T ], // InstallationStartedStage1
    [   F, F, F, F, F, F, F, T, T, T ], // InstallationFinishedStage1
    [   F, F, F, F, F, F, F, F, T, T ], // InstallationFinishedStage2
    [   F, F, F, F, F, F, F, F, F, T ], // InstallationFinishedStage3
    [   F, F, F, F, F, F, F, F, F, T ], // AlivePing
];

/// Whether `next` may be reported after `previous`.
///
/// Pure lookup, no side effects. Callers that get `false` must treat it as a
/// protocol violation and abort the install attempt.
pub fn is_legal_transition(previous: InstallerMessageKind, next: InstallerMessageKind) -> bool {
    TRANSITIONS[previous.ordinal() as usize][next.ordinal() as usize]
}

/// Whether `next` may open a session that has seen no stage yet
pub fn is_legal_first(next: InstallerMessageKind) -> bool {
    next == InstallerMessageKind::NotStarted
        || is_legal_transition(InstallerMessageKind::NotStarted, next)
}
