//! On-disk and file-level behaviour of the matrix store.

use neuro_cifti::{
    BackingState, ByteOrder, CachingMode, CiftiError, CiftiFile, CiftiHeader, DefaultFileNamer,
    IntentCode, MatrixStore, swap_bytes,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn sample_matrix(rows: usize, cols: usize) -> Vec<f32> {
    (0..rows * cols).map(|i| i as f32 * 0.5 - 3.0).collect()
}

fn floats_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Write a CIFTI file whose header and data use `order`
fn write_cifti(dir: &Path, name: &str, rows: usize, cols: usize, order: ByteOrder) -> PathBuf {
    let mut header = CiftiHeader::dense_connectivity();
    header.set_dimensions(&[rows, cols]).unwrap();
    let mut bytes = header.encode(order).unwrap();
    bytes.resize(header.vox_offset() as usize, 0);
    let mut data = sample_matrix(rows, cols);
    if order.needs_swap() {
        swap_bytes(&mut data);
    }
    bytes.extend_from_slice(bytemuck::cast_slice(&data));
    let path = dir.join(name);
    fs::File::create(&path).unwrap().write_all(&bytes).unwrap();
    path
}

#[test]
fn test_round_trip_both_modes_and_orders() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    for order in [ByteOrder::native(), ByteOrder::swapped()] {
        for mode in [CachingMode::InMemory, CachingMode::OnDisk] {
            let path = write_cifti(dir.path(), "round.dconn.nii", 5, 7, order);
            let file = CiftiFile::open(&path, mode, None).unwrap();
            let store = file.matrix();

            let mut original = vec![0f32; 35];
            store.get_matrix(&mut original).unwrap();
            assert_eq!(original, sample_matrix(5, 7), "{order} {mode}");

            let replacement: Vec<f32> = (0..35).map(|i| (i * i) as f32).collect();
            store.set_matrix(&replacement).unwrap();
            let mut out = vec![0f32; 35];
            store.get_matrix(&mut out).unwrap();
            assert_eq!(out, replacement);
        }
    }
}

#[test]
fn test_row_column_consistency_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "rc.dconn.nii", 6, 4, ByteOrder::swapped());
    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    let store = file.matrix();
    let mut rows = Vec::new();
    for i in 0..6 {
        let mut row = vec![0f32; 4];
        store.get_row(&mut row, i, false).unwrap();
        rows.push(row);
    }
    for j in 0..4 {
        let mut column = vec![0f32; 6];
        store.get_column(&mut column, j).unwrap();
        for i in 0..6 {
            assert_eq!(column[i], rows[i][j]);
        }
    }
}

#[test]
fn test_promotion_leaves_source_untouched() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "src.dconn.nii", 4, 3, ByteOrder::swapped());
    let before = fs::read(&path).unwrap();

    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    let store = file.matrix();
    let mut row = [0f32; 3];
    let mut column = [0f32; 4];
    for i in 0..4 {
        store.get_row(&mut row, i, false).unwrap();
    }
    store.get_column(&mut column, 2).unwrap();
    assert_eq!(store.backing_state().unwrap(), BackingState::ReadOnlyBacked);
    assert!(store.descriptor().unwrap().needs_byte_swap);

    store.set_row(&[100.0, 200.0, 300.0], 1).unwrap();
    assert_eq!(store.backing_state().unwrap(), BackingState::CacheBacked);
    assert!(!store.descriptor().unwrap().needs_byte_swap);
    assert_eq!(fs::read(&path).unwrap(), before);

    store.get_row(&mut row, 1, false).unwrap();
    assert_eq!(row, [100.0, 200.0, 300.0]);
    // untouched rows were carried into the cache in host order
    store.get_row(&mut row, 0, false).unwrap();
    assert_eq!(row.to_vec(), sample_matrix(4, 3)[0..3].to_vec());

    store.set_column(&[-1.0, -2.0, -3.0, -4.0], 0).unwrap();
    store.get_column(&mut column, 0).unwrap();
    assert_eq!(column, [-1.0, -2.0, -3.0, -4.0]);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_set_row_leaves_caller_buffer_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "buf.dconn.nii", 2, 3, ByteOrder::swapped());
    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    let data = [1.5f32, -2.25, 8.0];
    file.matrix().set_row(&data, 0).unwrap();
    assert_eq!(data, [1.5, -2.25, 8.0]);
}

#[test]
fn test_truncated_file_reports_short_read() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "short.dconn.nii", 4, 3, ByteOrder::native());
    let bytes = fs::read(&path).unwrap();
    // drop the last row and a half
    fs::write(&path, &bytes[..bytes.len() - 18]).unwrap();

    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    let mut row = [0f32; 3];
    match file.matrix().get_row(&mut row, 3, false) {
        Err(CiftiError::TruncatedFile { path: reported, message }) => {
            assert_eq!(reported, path);
            assert!(message.contains("file may be truncated"));
        }
        other => panic!("expected TruncatedFile, got {other:?}"),
    }
    row = [9.0; 3];
    file.matrix().get_row(&mut row, 3, true).unwrap();
    assert_eq!(row, [0.0; 3]);

    assert!(matches!(
        CiftiFile::open(&path, CachingMode::InMemory, None),
        Err(CiftiError::TruncatedFile { .. })
    ));
}

#[test]
fn test_on_disk_without_source_reads_zeros() {
    let dir = TempDir::new().unwrap();
    let mut store = MatrixStore::new(dir.path().join("absent.dconn.nii"), None);
    store.setup(&[3, 2], 544, CachingMode::OnDisk, true).unwrap();
    let mut row = [1f32; 2];
    store.get_row(&mut row, 2, false).unwrap();
    assert_eq!(row, [0.0, 0.0]);
    store.set_row(&[4.0, 5.0], 2).unwrap();
    store.get_row(&mut row, 2, false).unwrap();
    assert_eq!(row, [4.0, 5.0]);
}

#[test]
fn test_named_cache_file_and_self_write() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "named.dconn.nii", 3, 3, ByteOrder::native());
    let cache = dir.path().join("matrix.cache");
    let file = CiftiFile::open(&path, CachingMode::OnDisk, Some(cache.clone())).unwrap();
    let store = file.matrix();
    assert_eq!(store.cache_file_path().unwrap(), Some(cache.clone()));

    store.write_to_new_file(&cache, 544).unwrap();
    assert_eq!(store.backing_state().unwrap(), BackingState::CacheBacked);
    let mut out = vec![0f32; 9];
    store.get_matrix(&mut out).unwrap();
    assert_eq!(out, sample_matrix(3, 3));

    let cached = fs::read(&cache).unwrap();
    assert_eq!(floats_from_bytes(&cached[544..544 + 36]), sample_matrix(3, 3));
}

#[test]
fn test_temporary_cache_removed_on_drop() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "temp.dconn.nii", 2, 2, ByteOrder::native());
    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    let cache = file.matrix().cache_file_path().unwrap().unwrap();
    assert!(cache.exists());
    drop(file);
    assert!(!cache.exists());
}

#[test]
fn test_write_to_new_file_converts_to_native() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "swapped.dconn.nii", 3, 5, ByteOrder::swapped());
    for mode in [CachingMode::InMemory, CachingMode::OnDisk] {
        let file = CiftiFile::open(&path, mode, None).unwrap();
        let output = dir.path().join(format!("export_{mode}.bin"));
        file.matrix().write_to_new_file(&output, 16).unwrap();
        let bytes = fs::read(&output).unwrap();
        assert_eq!(bytes.len(), 16 + 60);
        assert_eq!(floats_from_bytes(&bytes[16..]), sample_matrix(3, 5));
        assert_eq!(file.matrix().backing_state().unwrap(), BackingState::ReadOnlyBacked);
    }
}

#[test]
fn test_cifti_file_write_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "in.dconn.nii", 4, 2, ByteOrder::swapped());
    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    file.matrix().set_row(&[7.0, 8.0], 3).unwrap();

    let output = dir.path().join("out.dconn.nii");
    file.write(&output).unwrap();
    let reopened = CiftiFile::open(&output, CachingMode::InMemory, None).unwrap();
    assert!(!reopened.header().needs_swap());
    assert_eq!(reopened.header().intent_code(), IntentCode::ConnectivityDense);
    let mut expected = sample_matrix(4, 2);
    expected[6..8].copy_from_slice(&[7.0, 8.0]);
    let mut out = vec![0f32; 8];
    reopened.matrix().get_matrix(&mut out).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn test_cifti_file_write_over_own_source() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "self.dconn.nii", 3, 2, ByteOrder::swapped());
    let file = CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap();
    file.write(&path).unwrap();
    drop(file);
    let reopened = CiftiFile::open(&path, CachingMode::InMemory, None).unwrap();
    assert!(!reopened.header().needs_swap());
    assert_eq!(reopened.matrix().matrix_array().unwrap().len(), 6);
    let mut out = vec![0f32; 6];
    reopened.matrix().get_matrix(&mut out).unwrap();
    assert_eq!(out, sample_matrix(3, 2));
}

#[test]
fn test_create_uses_default_names() {
    let mut namer = DefaultFileNamer::new();
    let mut header = CiftiHeader::dense_time_series();
    header.set_dimensions(&[10, 3]).unwrap();
    let first = CiftiFile::create(header.clone(), None, &mut namer, CachingMode::InMemory, None)
        .unwrap();
    let second = CiftiFile::create(header, None, &mut namer, CachingMode::InMemory, None).unwrap();
    assert_eq!(
        first.path(),
        Path::new("connectivity_dense_time_series_file_1.dtseries.nii")
    );
    assert_eq!(
        second.path(),
        Path::new("connectivity_dense_time_series_file_2.dtseries.nii")
    );
    assert_eq!(first.matrix().dimensions().unwrap(), [10, 3]);

    let mut other = DefaultFileNamer::new();
    assert_eq!(
        other.next_name(IntentCode::ConnectivityDense),
        PathBuf::from("connectivity_dense_file_1.dconn.nii")
    );
}

#[test]
fn test_open_rejects_non_cifti_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.dconn.nii");
    fs::write(&path, vec![7u8; 1024]).unwrap();
    match CiftiFile::open(&path, CachingMode::InMemory, None) {
        Err(CiftiError::MalformedHeader { message }) => {
            assert!(message.contains("garbage.dconn.nii"));
        }
        other => panic!("expected MalformedHeader, got {other:?}"),
    }
}

#[test]
fn test_concurrent_readers_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "threads.dconn.nii", 64, 16, ByteOrder::swapped());
    let file = Arc::new(CiftiFile::open(&path, CachingMode::OnDisk, None).unwrap());
    let expected = sample_matrix(64, 16);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let file = Arc::clone(&file);
            let expected = expected.clone();
            std::thread::spawn(move || {
                let mut row = vec![0f32; 16];
                for pass in 0..8 {
                    for r in (t..64).step_by(4) {
                        file.matrix().get_row(&mut row, r, false).unwrap();
                        if pass == 4 && t == 0 && r == 0 {
                            // promote mid-read with identical contents
                            file.matrix().set_row(&expected[0..16], 0).unwrap();
                        }
                        assert_eq!(row, expected[r * 16..(r + 1) * 16]);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_create_uses_named_cache_and_ignores_existing_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("existing.dconn.nii");
    fs::write(&path, vec![0xABu8; 2048]).unwrap();
    let cache = dir.path().join("wanted.cache");

    let mut header = CiftiHeader::dense_connectivity();
    header.set_dimensions(&[3, 2]).unwrap();
    let mut namer = DefaultFileNamer::new();
    let file = CiftiFile::create(
        header,
        Some(path.clone()),
        &mut namer,
        CachingMode::OnDisk,
        Some(cache.clone()),
    )
    .unwrap();
    let store = file.matrix();
    assert_eq!(store.cache_file_path().unwrap(), Some(cache.clone()));
    assert!(cache.exists());

    let mut row = [1f32; 2];
    store.get_row(&mut row, 1, false).unwrap();
    assert_eq!(row, [0.0, 0.0]);

    store.set_row(&[2.5, -1.0], 1).unwrap();
    file.write(&path).unwrap();
    let reopened = CiftiFile::open(&path, CachingMode::InMemory, None).unwrap();
    let mut out = vec![9f32; 6];
    reopened.matrix().get_matrix(&mut out).unwrap();
    assert_eq!(out, [0.0, 0.0, 2.5, -1.0, 0.0, 0.0]);
}

/// Header declaring `dims` followed by a small data block
fn write_header_only(dir: &Path, name: &str, dims: &[usize], data_bytes: usize) -> PathBuf {
    let mut header = CiftiHeader::dense_connectivity();
    header.set_dimensions(dims).unwrap();
    let mut bytes = header.encode(ByteOrder::native()).unwrap();
    bytes.resize(header.vox_offset() as usize + data_bytes, 0);
    let path = dir.join(name);
    fs::write(&path, &bytes).unwrap();
    path
}

#[test]
fn test_open_rejects_oversized_dimensions() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write_header_only(dir.path(), "huge.dconn.nii", &[1 << 62, 4], 64);
    for mode in [CachingMode::InMemory, CachingMode::OnDisk] {
        assert!(
            matches!(
                CiftiFile::open(&path, mode, None),
                Err(CiftiError::MalformedHeader { .. })
            ),
            "{mode}"
        );
    }

    let mut store = MatrixStore::default();
    assert!(matches!(
        store.setup(&[usize::MAX, 2], 0, CachingMode::InMemory, false),
        Err(CiftiError::MalformedHeader { .. })
    ));
    assert!(matches!(
        store.setup(&[1 << 61, 4], 0, CachingMode::OnDisk, false),
        Err(CiftiError::MalformedHeader { .. })
    ));
}

#[test]
fn test_in_memory_open_checks_length_before_loading() {
    let dir = TempDir::new().unwrap();
    let path = write_header_only(dir.path(), "large.dconn.nii", &[1 << 40, 4], 64);
    assert!(matches!(
        CiftiFile::open(&path, CachingMode::InMemory, None),
        Err(CiftiError::TruncatedFile { .. })
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_set_matrix_keeps_source_readable() {
    init_tracing();
    if !Path::new("/dev/full").exists() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let path = write_cifti(dir.path(), "full.dconn.nii", 4, 3, ByteOrder::swapped());
    // every write to this device fails with ENOSPC
    let file =
        CiftiFile::open(&path, CachingMode::OnDisk, Some(PathBuf::from("/dev/full"))).unwrap();
    let store = file.matrix();

    assert!(store.set_matrix(&vec![5.0; 12]).is_err());
    assert_eq!(store.backing_state().unwrap(), BackingState::ReadOnlyBacked);
    assert!(store.descriptor().unwrap().needs_byte_swap);

    let expected = sample_matrix(4, 3);
    let mut row = [0f32; 3];
    for r in 0..4 {
        store.get_row(&mut row, r, false).unwrap();
        assert_eq!(row, expected[r * 3..(r + 1) * 3]);
    }
}

#[test]
fn test_write_over_own_cache_requires_matching_offset() {
    let dir = TempDir::new().unwrap();
    let mut namer = DefaultFileNamer::new();
    let mut header = CiftiHeader::dense_connectivity();
    header.set_dimensions(&[3, 2]).unwrap();

    let cache = dir.path().join("in_place.cache");
    let file = CiftiFile::create(
        header.clone(),
        Some(dir.path().join("in_place.dconn.nii")),
        &mut namer,
        CachingMode::OnDisk,
        Some(cache.clone()),
    )
    .unwrap();
    file.matrix().set_row(&[1.0, 2.0], 0).unwrap();
    file.write(&cache).unwrap();
    drop(file);
    let reopened = CiftiFile::open(&cache, CachingMode::InMemory, None).unwrap();
    let mut out = vec![0f32; 6];
    reopened.matrix().get_matrix(&mut out).unwrap();
    assert_eq!(out, [1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);

    // an offset below the header size is raised on write, which the cache cannot follow
    header.set_vox_offset(100);
    let low_cache = dir.path().join("low_offset.cache");
    let file = CiftiFile::create(
        header,
        Some(dir.path().join("low_offset.dconn.nii")),
        &mut namer,
        CachingMode::OnDisk,
        Some(low_cache.clone()),
    )
    .unwrap();
    assert!(matches!(
        file.write(&low_cache),
        Err(CiftiError::Other { .. })
    ));
    let mut row = [7f32; 2];
    file.matrix().get_row(&mut row, 2, false).unwrap();
    assert_eq!(row, [0.0, 0.0]);
}
