//! Behaviour tests for the auth session.
//!
//! - `harness.rs`     - mock strategy, transport, popup and a wired session
//! - `login.rs`       - login outcomes, callbacks, redirects, superseded attempts
//! - `refresh.rs`     - refresh timer, retries and expiry (paused clock)
//! - `requests.rs`    - request template decoration
//! - `responses.rs`   - auth failure handling and logout
//! - `persistence.rs` - storage keys, restore and removal
//! - `strategies.rs`  - the shipped strategies driving a real session
//! - `router.rs`      - response routing, authenticated client, secure resource

mod requests;
mod responses;
