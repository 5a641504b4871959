// crates/db/src/queries/mod.rs
// Shapefile job CRUD for the shapefiley SQLite database.

mod shapefiles;
