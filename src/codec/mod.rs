// Codec module for the shapefile binary formats (.shp, .shx, .dbf)

pub mod decimal;
pub mod decode;
pub mod encode;
pub mod paths;
pub mod types;
