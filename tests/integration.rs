use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use sha2::{Digest, Sha256};

use dibk::{engine, Configuration, Store};

const MIB: i64 = 1024 * 1024;

fn random_bytes(len: usize) -> Vec<u8> {
	let mut buf = vec![0u8; len];
	rand::thread_rng().fill_bytes(&mut buf);
	buf
}

fn sha256_hex(bytes: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	hex::encode(hasher.finalize())
}

struct Fixture {
	_dir: tempfile::TempDir,
	config: Configuration,
	store: Arc<Store>,
}

impl Fixture {
	fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		let storage = dir.path().join("blocks");
		std::fs::create_dir_all(&storage).unwrap();
		let config = Configuration {
			db_path: dir.path().join("meta.db"),
			storage_location: storage,
			is_direct_io_enabled: false,
		};
		let store = Arc::new(Store::open(&config.db_path).unwrap());
		Fixture {
			_dir: dir,
			config,
			store,
		}
	}

	fn write_input(&self, name: &str, bytes: &[u8]) -> std::path::PathBuf {
		let path = self._dir.path().join(name);
		std::fs::write(&path, bytes).unwrap();
		path
	}

	async fn save(&self, name: &str, input: &Path, mb_per_block: i64) -> dibk::ObjectVersion {
		engine::save(Arc::clone(&self.store), &self.config, name, input, mb_per_block)
			.await
			.unwrap()
	}

	async fn retrieve(&self, name: &str, version: Option<i64>) -> Vec<u8> {
		let out = self._dir.path().join(format!("out-{:?}", version));
		engine::retrieve(Arc::clone(&self.store), &self.config, name, version, &out)
			.await
			.unwrap();
		std::fs::read(&out).unwrap()
	}
}

#[tokio::test]
async fn s1_round_trip_two_blocks() {
	let fx = Fixture::new();
	let f = random_bytes(2 * MIB as usize);
	let input = fx.write_input("f", &f);

	let ov = fx.save("a", &input, 1).await;
	assert_eq!(ov.version, 1);
	assert_eq!(ov.number_of_blocks, 2);
	assert_eq!(ov.block_size, MIB);

	let restored = fx.retrieve("a", Some(1)).await;
	assert_eq!(sha256_hex(&f), sha256_hex(&restored));

	let blocks = fx.store.list_blocks("a").unwrap();
	assert_eq!(blocks.len(), 2);
	assert!(blocks.iter().all(|b| b.version == 1));
	let mut indices: Vec<i64> = blocks.iter().map(|b| b.block_index).collect();
	indices.sort();
	assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn s2_one_changed_block() {
	let fx = Fixture::new();
	let mut f = random_bytes(2 * MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;
	let original = f.clone();

	let new_tail = random_bytes(MIB as usize);
	f[MIB as usize..].copy_from_slice(&new_tail);
	let input2 = fx.write_input("f", &f);
	fx.save("a", &input2, 1).await;

	let blocks = fx.store.list_blocks("a").unwrap();
	let v2: Vec<_> = blocks.iter().filter(|b| b.version == 2).collect();
	assert_eq!(v2.len(), 1);
	assert_eq!(v2[0].block_index, 1);
	assert!(!blocks.iter().any(|b| b.version == 2 && b.block_index == 0));

	assert_eq!(sha256_hex(&original), sha256_hex(&fx.retrieve("a", Some(1)).await));
	assert_eq!(sha256_hex(&f), sha256_hex(&fx.retrieve("a", Some(2)).await));
}

#[tokio::test]
async fn s3_grow_by_one_block() {
	let fx = Fixture::new();
	let f = random_bytes(2 * MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;

	let mut grown = f.clone();
	grown.extend(random_bytes(MIB as usize));
	let input2 = fx.write_input("f", &grown);
	let ov2 = fx.save("a", &input2, 1).await;
	assert_eq!(ov2.number_of_blocks, 3);

	let blocks = fx.store.list_blocks("a").unwrap();
	let v2: Vec<_> = blocks.iter().filter(|b| b.version == 2).collect();
	assert_eq!(v2.len(), 1);
	assert_eq!(v2[0].block_index, 2);

	assert_eq!(sha256_hex(&grown), sha256_hex(&fx.retrieve("a", Some(2)).await));
}

#[tokio::test]
async fn s4_shrink_by_one_block() {
	let fx = Fixture::new();
	let f = random_bytes(2 * MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;

	let shrunk = f[..MIB as usize].to_vec();
	let input2 = fx.write_input("f", &shrunk);
	let ov2 = fx.save("a", &input2, 1).await;
	assert_eq!(ov2.number_of_blocks, 1);

	let blocks = fx.store.list_blocks("a").unwrap();
	assert!(!blocks.iter().any(|b| b.version == 2));

	assert_eq!(sha256_hex(&f), sha256_hex(&fx.retrieve("a", Some(1)).await));
	assert_eq!(sha256_hex(&shrunk), sha256_hex(&fx.retrieve("a", Some(2)).await));
}

#[tokio::test]
async fn s5_non_multiple_file_size() {
	let fx = Fixture::new();
	let f = random_bytes(2 * MIB as usize + 1);
	let input = fx.write_input("f", &f);

	let ov = fx.save("a", &input, 1).await;
	assert_eq!(ov.number_of_blocks, 3);

	let blocks = fx.store.list_blocks("a").unwrap();
	let last = blocks.iter().find(|b| b.block_index == 2).unwrap();
	let on_disk = std::fs::metadata(&last.location).unwrap().len();
	assert_eq!(on_disk, 1);

	let restored = fx.retrieve("a", Some(1)).await;
	assert_eq!(restored.len(), f.len());
	assert_eq!(sha256_hex(&f), sha256_hex(&restored));
}

#[tokio::test]
async fn s6_unknown_retrieval() {
	let fx = Fixture::new();
	let out = fx._dir.path().join("missing-out");
	let err = engine::retrieve(Arc::clone(&fx.store), &fx.config, "missing", Some(1), &out)
		.await
		.unwrap_err();
	assert!(matches!(err, dibk::Error::NotFound(_)));
	assert!(!out.exists());
}

#[tokio::test]
async fn block_size_mismatch_is_rejected() {
	let fx = Fixture::new();
	let f = random_bytes(MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;

	let f2 = random_bytes(MIB as usize);
	let input2 = fx.write_input("f2", &f2);
	let err = engine::save(Arc::clone(&fx.store), &fx.config, "a", &input2, 2)
		.await
		.unwrap_err();
	assert!(matches!(err, dibk::Error::BlockSizeMismatch { .. }));

	// no new version was committed
	assert_eq!(fx.store.count_versions("a").unwrap(), 1);
}

#[tokio::test]
async fn checksums_match_on_disk_bytes() {
	let fx = Fixture::new();
	let f = random_bytes(2 * MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;

	for block in fx.store.list_blocks("a").unwrap() {
		let bytes = std::fs::read(&block.location).unwrap();
		assert_eq!(sha256_hex(&bytes), block.checksum);
	}
}

#[tokio::test]
async fn empty_file_has_zero_blocks() {
	let fx = Fixture::new();
	let input = fx.write_input("empty", &[]);
	let ov = fx.save("a", &input, 1).await;
	assert_eq!(ov.number_of_blocks, 0);

	let restored = fx.retrieve("a", Some(1)).await;
	assert!(restored.is_empty());
}

#[tokio::test]
async fn collision_refusal_leaves_store_untouched() {
	let fx = Fixture::new();
	let f = random_bytes(MIB as usize);
	let input = fx.write_input("f", &f);
	fx.save("a", &input, 1).await;

	// Plant a conflicting block file at the path version 2 would need.
	let conflicting = dibk::writer::block_path(&fx.config.storage_location, "a", 2, 0);
	std::fs::write(&conflicting, b"squatting").unwrap();

	let f2 = random_bytes(MIB as usize);
	let input2 = fx.write_input("f2", &f2);
	let err = engine::save(Arc::clone(&fx.store), &fx.config, "a", &input2, 1)
		.await
		.unwrap_err();
	assert!(matches!(err, dibk::Error::Conflict(_)));
	assert_eq!(fx.store.count_versions("a").unwrap(), 1);
}
