// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! MultiRig: a coordination layer that presents several Hamlib
//! `rigctld`-compatible transceivers as one virtual rig, mirroring
//! frequency, mode and VFO from a designated main rig to its followers.

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod rig;
pub mod sync;

pub use error::{RigError, RigErrorKind};
pub use registry::{AppConfig, Registry};
pub use rig::client::Client;
pub use rig::{RigCapabilities, RigConfig, RigSnapshot};
