//! Maum — the conversation core of an AI journaling counselor.
//!
//! A user talks to an LLM-backed counselor persona; each session keeps an
//! ordered turn history, drives a two-phase prompting protocol, validates
//! the model's output against a typed contract, and ends with a structured
//! summary (emotions, insights, action items).
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod logging;
pub mod providers;
pub mod session;

pub mod adapters;
pub mod service;
