// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod error;
pub mod member;
pub mod process;

pub use error::PtyError;
pub use member::Member;
pub use process::{LocalPty, PtySpawnOptions, PtyProcess};
