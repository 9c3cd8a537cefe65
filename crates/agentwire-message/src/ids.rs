//! Stable wire type ids.
//!
//! Requests live in the 100s, their replies at the same offset in the 200s,
//! broadcasts in the 300s. Id 1 is the built-in failure reply.

pub const PING: i16 = 100;
pub const GET_PROPERTIES: i16 = 101;
pub const SET_PROPERTY: i16 = 102;
pub const GET_CLASS_LOADERS: i16 = 110;
pub const GET_LOADER_CLASSES: i16 = 111;
pub const GET_CLASS: i16 = 112;
pub const REDEFINE: i16 = 113;
pub const GET_FIELD: i16 = 114;
pub const SET_FIELD: i16 = 115;
pub const GET_THREADS: i16 = 116;

pub const PONG: i16 = 200;
pub const PROPERTIES: i16 = 201;
pub const SET_PROPERTY_ACK: i16 = 202;
pub const CLASS_LOADERS: i16 = 210;
pub const LOADER_CLASSES: i16 = 211;
pub const CLASS_REPLY: i16 = 212;
pub const REDEFINE_ACK: i16 = 213;
pub const FIELD_VALUE: i16 = 214;
pub const FIELD_SET_ACK: i16 = 215;
pub const THREADS: i16 = 216;

pub const LOADER_DISCOVERED: i16 = 300;
pub const CLASS_UPDATED: i16 = 301;

/// Class-grouping id of the bootstrap loader.
pub const BOOTSTRAP_LOADER_ID: i32 = 0;
/// Class-grouping id of the system (application) loader.
pub const SYSTEM_LOADER_ID: i32 = 1;
