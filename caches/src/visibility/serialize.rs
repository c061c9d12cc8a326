//! Persistent Cache Serialization
//!
//! The cache file is a versioned little-endian binary container holding the
//! build parameters, the entry array and the serialized BVH index, in that
//! order.

use crate::scene_visibility::VisibilityTraceParams;
use crate::visibility::{
    CacheEntry, EnvVisibilityCache, EnvVisibilityCacheParams, EnvVisibilityMapParams, PersistentCacheParams,
};
use crate::CacheError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lumen_accelerators::IndexBvh;
use lumen_core::base::Float;
use lumen_core::geometry::{Normal3f, Point3f};
use lumen_core::sampling::Distribution2D;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

const MAGIC: [u8; 4] = *b"ELVC";
const VERSION: u32 = 1;

/// Load a persistent cache file. Fails loudly on any decoding problem; a
/// partially readable cache is never accepted.
///
/// * `file_name` - The cache file path.
pub(crate) fn load_persistent_cache(file_name: &str) -> Result<EnvVisibilityCache, CacheError> {
    info!("Loading persistent visibility cache: {file_name}");

    let mut reader = BufReader::new(File::open(file_name)?);

    let mut magic = [0_u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CacheError::BadMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }

    let mut params = read_params(&mut reader)?;
    params.persistent.file_name = Some(String::from(file_name));

    let entry_count = reader.read_u32::<LittleEndian>()? as usize;
    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        entries.push(read_entry(&mut reader)?);
    }

    let bvh = if reader.read_u8()? != 0 {
        Some(IndexBvh::read_from(&mut reader)?)
    } else {
        None
    };

    // The stream must be fully consumable.
    let mut trailing = [0_u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(CacheError::TrailingData);
    }

    info!("Loaded persistent visibility cache: {} entries", entries.len());

    Ok(EnvVisibilityCache::from_parts(params, entries, bvh))
}

/// Save the cache. With `safe_save` the data is written to a temporary file
/// first and atomically renamed into place, so a crash can never leave a
/// partial cache behind.
///
/// * `cache`     - The built cache.
/// * `file_name` - The cache file path.
/// * `safe_save` - Use the write-to-temp-then-rename discipline.
pub(crate) fn save_persistent_cache(
    cache: &EnvVisibilityCache,
    file_name: &str,
    safe_save: bool,
) -> Result<(), CacheError> {
    info!("Saving persistent visibility cache: {file_name}");

    let write_name = if safe_save {
        format!("{file_name}.tmp")
    } else {
        String::from(file_name)
    };

    {
        let mut writer = BufWriter::new(File::create(&write_name)?);

        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;

        write_params(&mut writer, cache.params())?;

        writer.write_u32::<LittleEndian>(cache.entries().len() as u32)?;
        for entry in cache.entries() {
            write_entry(&mut writer, entry)?;
        }

        match cache.bvh() {
            Some(bvh) => {
                writer.write_u8(1)?;
                bvh.write_to(&mut writer)?;
            }
            None => writer.write_u8(0)?,
        }

        writer.flush()?;
    }

    if safe_save {
        std::fs::rename(&write_name, file_name)?;
    }

    Ok(())
}

fn write_params<W: Write>(writer: &mut W, params: &EnvVisibilityCacheParams) -> Result<(), CacheError> {
    writer.write_u32::<LittleEndian>(params.map.width)?;
    writer.write_u32::<LittleEndian>(params.map.height)?;
    writer.write_u32::<LittleEndian>(params.map.sample_count)?;
    writer.write_u8(params.map.sample_upper_hemisphere_only as u8)?;

    writer.write_u32::<LittleEndian>(params.visibility.max_sample_count)?;
    writer.write_u32::<LittleEndian>(params.visibility.max_path_depth)?;
    writer.write_f32::<LittleEndian>(params.visibility.target_hit_rate)?;
    writer.write_f32::<LittleEndian>(params.visibility.lookup_radius)?;
    writer.write_f32::<LittleEndian>(params.visibility.lookup_normal_angle)?;

    writer.write_u8(params.persistent.safe_save as u8)?;
    Ok(())
}

fn read_params<R: Read>(reader: &mut R) -> Result<EnvVisibilityCacheParams, CacheError> {
    let map = EnvVisibilityMapParams {
        width: reader.read_u32::<LittleEndian>()?,
        height: reader.read_u32::<LittleEndian>()?,
        sample_count: reader.read_u32::<LittleEndian>()?,
        sample_upper_hemisphere_only: reader.read_u8()? != 0,
    };
    let visibility = VisibilityTraceParams {
        max_sample_count: reader.read_u32::<LittleEndian>()?,
        max_path_depth: reader.read_u32::<LittleEndian>()?,
        target_hit_rate: reader.read_f32::<LittleEndian>()?,
        lookup_radius: reader.read_f32::<LittleEndian>()?,
        lookup_normal_angle: reader.read_f32::<LittleEndian>()?,
    };
    let persistent = PersistentCacheParams {
        file_name: None, // restored by the caller
        safe_save: reader.read_u8()? != 0,
    };
    Ok(EnvVisibilityCacheParams { map, visibility, persistent })
}

fn write_entry<W: Write>(writer: &mut W, entry: &CacheEntry) -> Result<(), CacheError> {
    for v in [entry.p.x, entry.p.y, entry.p.z, entry.n.x, entry.n.y, entry.n.z] {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.write_u8(entry.is_volume as u8)?;

    match entry.map.as_ref() {
        Some(map) => {
            writer.write_u8(1)?;
            writer.write_u32::<LittleEndian>(map.width() as u32)?;
            writer.write_u32::<LittleEndian>(map.height() as u32)?;
            for y in 0..map.height() {
                for x in 0..map.width() {
                    writer.write_f32::<LittleEndian>(map.func_value(x, y))?;
                }
            }
        }
        None => writer.write_u8(0)?,
    }
    Ok(())
}

fn read_entry<R: Read>(reader: &mut R) -> Result<CacheEntry, CacheError> {
    let mut values = [0.0_f32; 6];
    for v in values.iter_mut() {
        *v = reader.read_f32::<LittleEndian>()?;
    }
    let is_volume = reader.read_u8()? != 0;

    let map = if reader.read_u8()? != 0 {
        let width = reader.read_u32::<LittleEndian>()? as usize;
        let height = reader.read_u32::<LittleEndian>()? as usize;
        let mut func: Vec<Float> = Vec::with_capacity(width * height);
        for _ in 0..width * height {
            func.push(reader.read_f32::<LittleEndian>()?);
        }
        Some(Distribution2D::new(&func, width, height))
    } else {
        None
    };

    Ok(CacheEntry {
        p: Point3f::new(values[0], values[1], values[2]),
        n: Normal3f::new(values[3], values[4], values[5]),
        is_volume,
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::geometry::Point2f;

    fn sample_cache() -> EnvVisibilityCache {
        let entries = vec![
            CacheEntry {
                p: Point3f::new(0.0, 0.0, 0.0),
                n: Normal3f::new(0.0, 0.0, 1.0),
                is_volume: false,
                map: Some(Distribution2D::new(&[0.1, 0.9, 0.5, 0.5, 0.0, 1.0, 0.3, 0.7], 4, 2)),
            },
            CacheEntry {
                p: Point3f::new(1.0, 0.0, 0.0),
                n: Normal3f::new(0.0, 0.0, 1.0),
                is_volume: false,
                map: None,
            },
        ];
        let bvh = IndexBvh::new(&entries, 0.25, 25.0);
        EnvVisibilityCache::from_parts(EnvVisibilityCacheParams::default(), entries, Some(bvh))
    }

    #[test]
    fn round_trip_preserves_queries_and_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elvc.bin");
        let path = path.to_str().unwrap();

        let cache = sample_cache();
        save_persistent_cache(&cache, path, true).unwrap();
        let loaded = load_persistent_cache(path).unwrap();

        assert_eq!(loaded.entries().len(), cache.entries().len());

        let up = Normal3f::new(0.0, 0.0, 1.0);
        for probe in [Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0), Point3f::new(0.5, 0.5, 0.0)] {
            let a = cache.lookup(&probe, &up, false).is_some();
            let b = loaded.lookup(&probe, &up, false).is_some();
            assert_eq!(a, b);
        }

        // Map contents survive the round trip exactly.
        let original = cache.entries()[0].map.as_ref().unwrap();
        let restored = loaded.entries()[0].map.as_ref().unwrap();
        assert_eq!(original.width(), restored.width());
        assert_eq!(original.height(), restored.height());
        for y in 0..original.height() {
            for x in 0..original.width() {
                assert_eq!(original.func_value(x, y), restored.func_value(x, y));
            }
        }
        let u = Point2f::new(0.3, 0.6);
        assert_eq!(original.sample_continuous(&u), restored.sample_continuous(&u));
    }

    #[test]
    fn safe_save_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elvc.bin");
        let path = path.to_str().unwrap();

        save_persistent_cache(&sample_cache(), path, true).unwrap();
        assert!(std::path::Path::new(path).exists());
        assert!(!std::path::Path::new(&format!("{path}.tmp")).exists());
    }

    #[test]
    fn truncated_file_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elvc.bin");
        let path = path.to_str().unwrap();

        save_persistent_cache(&sample_cache(), path, false).unwrap();
        let bytes = std::fs::read(path).unwrap();
        std::fs::write(path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(load_persistent_cache(path), Err(CacheError::Io(_))));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elvc.bin");
        let path = path.to_str().unwrap();

        std::fs::write(path, b"NOPE0000000000000000").unwrap();
        assert!(matches!(load_persistent_cache(path), Err(CacheError::BadMagic)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elvc.bin");
        let path = path.to_str().unwrap();

        save_persistent_cache(&sample_cache(), path, false).unwrap();
        let mut bytes = std::fs::read(path).unwrap();
        bytes.push(0xAB);
        std::fs::write(path, &bytes).unwrap();

        assert!(matches!(load_persistent_cache(path), Err(CacheError::TrailingData)));
    }
}
