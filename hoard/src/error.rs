// MIT LICENSE
//
// Copyright (c) 2024 Hoard Engine Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

use hoard_object::ObjectId;

/// Engine-level errors.
///
/// Store-level failures are never recovered from inside the core; they
/// propagate to the caller. A missing object behind a live root is
/// corruption, not an absent value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A named root was required but is not registered.
    #[error("missing root: {0}")]
    MissingRoot(String),

    /// A live root or tree references an object the store does not hold.
    #[error("missing object {0}")]
    MissingObject(ObjectId),

    /// Stored bytes for an object failed to decode.
    #[error("corrupt object {id}: {source}")]
    CorruptObject {
        /// ID the bytes were stored under.
        id: ObjectId,
        /// Decode failure detail.
        source: hoard_object::Error,
    },

    /// The deferred-operations queue still holds items at a point where it
    /// must be empty.
    #[error("deferred operations not flushed")]
    DeferredOpsNotFlushed,

    /// Post-GC (or other) validation found the store in an impossible
    /// state.
    #[error("inconsistent store: {0}")]
    InconsistentStore(String),

    /// An internal precondition was violated by the caller or by stored
    /// data.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A path was not of the required shape.
    #[error("bad path: {0}")]
    BadPath(#[from] hoard_path::PathError),

    /// A cave UUID is not present in the configuration.
    #[error("unknown cave: {0}")]
    UnknownCave(String),

    /// An operation was attempted against a cave of the wrong type.
    #[error("wrong cave type: {0}")]
    WrongCaveType(String),

    /// Storage-layer failure.
    #[error(transparent)]
    Storage(#[from] hoard_storage::Error),

    /// Object-model failure outside of a store read.
    #[error(transparent)]
    Object(#[from] hoard_object::Error),
}
