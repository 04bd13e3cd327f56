// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Durable stores backing the agent: bridge subscriptions and deposit
//! workflow records, each in its own embedded sled database.

mod account;
mod state;

pub use account::AccountStore;
pub use state::StateStore;
