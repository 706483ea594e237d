//! Integration tests for cronsync-reconcile.
//!
//! A temporary project tree plays the role of the deployed project and the
//! in-memory fake backend plays EventBridge/Lambda, so no AWS credentials
//! are needed.

mod scenarios;
mod support;
