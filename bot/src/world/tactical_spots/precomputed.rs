// tactical_bot_core/bot/src/world/tactical_spots/precomputed.rs
//! On-disk cache of generated tactical spots.
//!
//! Layout: `TSPT` magic, little-endian `u32` version, then a zstd frame with
//! the map name, area count, spots, grid parameters, cell offsets, packed cell
//! lists, the visibility table and the travel time table.

use crate::core::constants::{MAX_SPOTS, PRECOMPUTED_SPOTS_MAGIC, PRECOMPUTED_SPOTS_VERSION};
use crate::core::error::{BotError, BotResult};
use crate::core::types::*;
use crate::world::tactical_spots::grid::SpotsGrid;
use crate::world::tactical_spots::registry::{TacticalSpot, TacticalSpotsRegistry};
use bytes::{Buf, BufMut, BytesMut};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ZSTD_LEVEL: i32 = 3;
const MAX_MAP_NAME_LEN: usize = 256;

pub fn cache_file_path(cache_dir: &Path, map_name: &str) -> PathBuf {
    let file_stem: String = map_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    cache_dir.join(format!("{}.tspots", file_stem))
}

fn put_vec3(buf: &mut BytesMut, v: Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

pub fn encode(registry: &TacticalSpotsRegistry) -> BotResult<Vec<u8>> {
    let mut payload = BytesMut::with_capacity(
        64 + registry.num_spots() * 40 + registry.visibility_table().len() + 2 * registry.travel_time_table().len(),
    );

    let name = registry.map_name().as_bytes();
    payload.put_u32_le(name.len() as u32);
    payload.put_slice(name);
    payload.put_u32_le(registry.num_areas() as u32);

    payload.put_u32_le(registry.num_spots() as u32);
    for spot in registry.spots() {
        put_vec3(&mut payload, spot.origin);
        put_vec3(&mut payload, spot.absmin);
        put_vec3(&mut payload, spot.absmax);
        payload.put_u32_le(spot.area_num);
    }

    let grid = registry.grid();
    let (world_mins, world_maxs) = grid.world_bounds();
    put_vec3(&mut payload, world_mins);
    put_vec3(&mut payload, world_maxs);
    for side in grid.cell_size() {
        payload.put_f32_le(side);
    }
    for dimension in grid.dimensions() {
        payload.put_u32_le(dimension);
    }
    payload.put_u32_le(grid.cell_offsets().len() as u32);
    for &offset in grid.cell_offsets() {
        payload.put_u32_le(offset);
    }
    payload.put_u32_le(grid.packed_cell_spots().len() as u32);
    for &spot_num in grid.packed_cell_spots() {
        payload.put_u16_le(spot_num);
    }

    payload.put_u32_le(registry.visibility_table().len() as u32);
    payload.put_slice(registry.visibility_table());
    payload.put_u32_le(registry.travel_time_table().len() as u32);
    for &time in registry.travel_time_table() {
        payload.put_u16_le(time);
    }

    let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL)?;
    let mut data = Vec::with_capacity(8 + compressed.len());
    data.extend_from_slice(PRECOMPUTED_SPOTS_MAGIC);
    data.put_u32_le(PRECOMPUTED_SPOTS_VERSION);
    data.extend_from_slice(&compressed);
    Ok(data)
}

/// Bounds-checked reads over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, num_bytes: usize, what: &str) -> BotResult<()> {
        if self.buf.remaining() < num_bytes {
            return Err(BotError::PrecomputedData(format!("Truncated data while reading {}", what)));
        }
        Ok(())
    }

    fn u32(&mut self, what: &str) -> BotResult<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn f32(&mut self, what: &str) -> BotResult<f32> {
        self.need(4, what)?;
        let value = self.buf.get_f32_le();
        if !value.is_finite() {
            return Err(BotError::PrecomputedData(format!("A non-finite value of {}", what)));
        }
        Ok(value)
    }

    fn vec3(&mut self, what: &str) -> BotResult<Vec3> {
        Ok(Vec3::new(self.f32(what)?, self.f32(what)?, self.f32(what)?))
    }

    /// Reads a length prefix and checks the data for it is present.
    fn length_prefix(&mut self, element_size: usize, what: &str) -> BotResult<usize> {
        let len = self.u32(what)? as usize;
        self.need(len.saturating_mul(element_size), what)?;
        Ok(len)
    }

    fn u16_vec(&mut self, what: &str) -> BotResult<Vec<u16>> {
        let len = self.length_prefix(2, what)?;
        Ok((0..len).map(|_| self.buf.get_u16_le()).collect())
    }

    fn u32_vec(&mut self, what: &str) -> BotResult<Vec<u32>> {
        let len = self.length_prefix(4, what)?;
        Ok((0..len).map(|_| self.buf.get_u32_le()).collect())
    }

    fn bytes(&mut self, what: &str) -> BotResult<&'a [u8]> {
        let len = self.length_prefix(1, what)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

pub fn decode(
    data: &[u8],
    expected_map_name: &str,
    expected_num_areas: usize,
    max_spots_per_query: usize,
) -> BotResult<TacticalSpotsRegistry> {
    if data.len() < 8 || &data[..4] != PRECOMPUTED_SPOTS_MAGIC {
        return Err(BotError::PrecomputedData("Missing magic".into()));
    }
    let mut version_bytes = &data[4..8];
    let version = version_bytes.get_u32_le();
    if version != PRECOMPUTED_SPOTS_VERSION {
        return Err(BotError::PrecomputedData(format!(
            "Version mismatch: expected {}, got {}",
            PRECOMPUTED_SPOTS_VERSION, version
        )));
    }
    let payload = zstd::decode_all(&data[8..])?;
    let mut reader = Reader { buf: &payload };

    let name = reader.bytes("map name")?;
    if name.len() > MAX_MAP_NAME_LEN || name != expected_map_name.as_bytes() {
        return Err(BotError::PrecomputedData(format!(
            "The data belongs to map '{}'",
            String::from_utf8_lossy(&name[..name.len().min(MAX_MAP_NAME_LEN)])
        )));
    }
    let num_areas = reader.u32("area count")? as usize;
    if num_areas != expected_num_areas {
        return Err(BotError::PrecomputedData(format!(
            "Area count mismatch: expected {}, got {}",
            expected_num_areas, num_areas
        )));
    }

    let num_spots = reader.length_prefix(40, "spots")?;
    if num_spots > MAX_SPOTS {
        return Err(BotError::PrecomputedData(format!("Too many spots: {}", num_spots)));
    }
    let mut spots = Vec::with_capacity(num_spots);
    for _ in 0..num_spots {
        spots.push(TacticalSpot {
            origin: reader.vec3("spot origin")?,
            absmin: reader.vec3("spot mins")?,
            absmax: reader.vec3("spot maxs")?,
            area_num: reader.u32("spot area")?,
        });
    }

    let world_mins = reader.vec3("grid mins")?;
    let world_maxs = reader.vec3("grid maxs")?;
    let cell_size = [reader.f32("cell size")?, reader.f32("cell size")?, reader.f32("cell size")?];
    let num_cells = [reader.u32("grid dimension")?, reader.u32("grid dimension")?, reader.u32("grid dimension")?];
    let cell_offsets = reader.u32_vec("cell offsets")?;
    let cell_spots = reader.u16_vec("cell spots")?;
    let grid = SpotsGrid::from_parts(world_mins, world_maxs, cell_size, num_cells, cell_offsets, cell_spots, num_spots)?;

    let visibility = reader.bytes("visibility table")?.to_vec();
    let travel_times = reader.u16_vec("travel time table")?;
    if reader.buf.has_remaining() {
        return Err(BotError::PrecomputedData(format!("{} trailing bytes", reader.buf.remaining())));
    }

    TacticalSpotsRegistry::from_parts(
        expected_map_name,
        spots,
        grid,
        num_areas,
        visibility,
        travel_times,
        max_spots_per_query,
    )
}

pub fn save(cache_dir: &Path, registry: &TacticalSpotsRegistry) -> BotResult<PathBuf> {
    fs::create_dir_all(cache_dir)?;
    let path = cache_file_path(cache_dir, registry.map_name());
    let data = encode(registry)?;
    // Write-then-rename so a reader never sees a partially written file
    let tmp_path = path.with_extension("tspots.tmp");
    fs::write(&tmp_path, &data)?;
    fs::rename(&tmp_path, &path)?;
    debug!("Wrote {} bytes of tactical spots to {:?}", data.len(), path);
    Ok(path)
}

pub fn load(path: &Path, map_name: &str, num_areas: usize, max_spots_per_query: usize) -> BotResult<TacticalSpotsRegistry> {
    let data = fs::read(path)?;
    decode(&data, map_name, num_areas, max_spots_per_query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TacticalConfig;
    use crate::world::map_generator::MapGenerator;
    use crate::world::route_cache::AasRouteCache;
    use crate::world::tactical_spots::builder::TacticalSpotsBuilder;

    fn corridor_registry() -> (TacticalSpotsRegistry, usize) {
        let map = MapGenerator::generate_corridor("corridor", 5, 192.0).unwrap();
        let route_cache = AasRouteCache::new(map.aas.clone());
        let config = TacticalConfig::default();
        let registry = TacticalSpotsBuilder::new(&map.aas, &route_cache, map.collision.as_ref(), &config)
            .build("corridor")
            .unwrap();
        (registry, map.aas.num_areas())
    }

    #[test]
    fn decoded_registry_matches() {
        let (registry, num_areas) = corridor_registry();
        let data = encode(&registry).unwrap();
        let decoded = decode(&data, "corridor", num_areas, 768).unwrap();
        assert_eq!(decoded.spots(), registry.spots());
        assert_eq!(decoded.grid(), registry.grid());
        assert_eq!(decoded.visibility_table(), registry.visibility_table());
        assert_eq!(decoded.travel_time_table(), registry.travel_time_table());
    }

    #[test]
    fn foreign_or_damaged_data_is_rejected() {
        let (registry, num_areas) = corridor_registry();
        let data = encode(&registry).unwrap();

        assert!(matches!(decode(&data, "other_map", num_areas, 768), Err(BotError::PrecomputedData(_))));
        assert!(matches!(decode(&data, "corridor", num_areas + 1, 768), Err(BotError::PrecomputedData(_))));

        let mut wrong_version = data.clone();
        wrong_version[4] = wrong_version[4].wrapping_add(1);
        assert!(matches!(decode(&wrong_version, "corridor", num_areas, 768), Err(BotError::PrecomputedData(_))));

        let truncated = &data[..data.len() / 2];
        assert!(decode(truncated, "corridor", num_areas, 768).is_err());
    }

    #[test]
    fn file_names_are_sanitized() {
        let path = cache_file_path(Path::new("/tmp/cache"), "maps/dm 1");
        assert_eq!(path, Path::new("/tmp/cache/maps_dm_1.tspots"));
    }

    #[test]
    fn save_then_load_from_disk() {
        let (registry, num_areas) = corridor_registry();
        let dir = tempfile::tempdir().unwrap();
        let path = save(dir.path(), &registry).unwrap();
        assert!(path.exists());
        let loaded = load(&path, "corridor", num_areas, 768).unwrap();
        assert_eq!(loaded.num_spots(), registry.num_spots());
    }
}
