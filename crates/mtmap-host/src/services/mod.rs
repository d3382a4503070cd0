// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: connects the stdin/stdout protocol stream to the bridge
// session and resolves where configuration lives.

pub mod data_dir;
pub mod router;
pub mod wire;
