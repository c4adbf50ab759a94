//! Identity and pairing commands.
//!
//! # Examples
//!
//! ```bash
//! ivathy create-user Ana
//! ivathy generate-code --user <ana-id>
//! ivathy join --user <luis-id> --code AB12C9
//! ivathy status --user <ana-id>
//! ```

use anyhow::Result;

use super::print_json;
use crate::service::Ivathy;

/// Create a user and print the record.
pub fn create_user(app: &Ivathy, name: &str) -> Result<()> {
    let user = app.create_identity(name)?;
    print_json(&user)
}

/// Issue a pairing code for `user_id`.
pub fn generate_code(app: &Ivathy, user_id: &str) -> Result<()> {
    let response = app.generate_pairing_code(user_id)?;
    print_json(&response)
}

/// Join the user who issued `code`.
pub fn join(app: &Ivathy, user_id: &str, code: &str) -> Result<()> {
    let response = app.join_pairing(user_id, code)?;
    print_json(&response)
}

/// Print the current partner of `user_id`.
pub fn status(app: &Ivathy, user_id: &str) -> Result<()> {
    let response = app.check_pair_status(user_id)?;
    print_json(&response)
}
