//! Deezer track downloader.
//!
//! Downloads tracks and albums from Deezer and decrypts them into playable
//! files. The protocol core is free of I/O:
//! * [`decrypt`] derives track keys and decrypts the striped stream
//! * [`url_token`] derives the CDN download URL of a track
//!
//! Around that, [`gateway`] resolves track and album metadata for a
//! session, and [`download`] drives the network-to-disk pipeline.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod arl;
pub mod config;
pub mod decrypt;
pub mod download;
pub mod error;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod track;
pub mod url_token;
pub mod util;
