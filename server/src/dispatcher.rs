//! Applies decoded commands to the grid store

use crate::error::{DispatchError, GridError};
use crate::grid::GridStore;
use log::debug;
use shared::Command;

/// Runs a validated command against the store.
///
/// WRITE produces no reply; READ replies with the accumulated word.
pub fn process_command(
    store: &GridStore,
    command: Command,
) -> Result<Option<String>, GridError> {
    match command {
        Command::Write {
            origin,
            direction,
            word,
        } => {
            store.write(origin, direction, word.as_bytes())?;
            Ok(None)
        }
        Command::Read { origin, direction } => store.read(origin, direction).map(Some),
    }
}

/// Validates a raw token list and runs it.
///
/// Shapes the protocol ignores yield `Ok(None)` just like a WRITE does.
pub fn process_tokens(
    store: &GridStore,
    tokens: &[String],
) -> Result<Option<String>, DispatchError> {
    match Command::parse(tokens)? {
        Some(command) => Ok(process_command(store, command)?),
        None => {
            debug!("Ignoring command {:?}", tokens);
            Ok(None)
        }
    }
}
