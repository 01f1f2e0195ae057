//! GeoServer and GRASS GIS interactions, and the commands built on them.

pub(crate) mod api;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod grass;
pub(crate) mod models;
pub(crate) mod mosaic;
pub(crate) mod sld;
