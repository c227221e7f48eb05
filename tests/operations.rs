use assert_fs::fixture::*;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tarcel::remote::{ByteStream, ObjectInfo};
use tarcel::{
    Error, ErrorKind, LogLevel, MemorySink, ObjectClient, ObjectStoreClient, OperationLog,
    RemoteStore, Result, Tarcel,
};

fn tarcel_with_memory_store() -> (Tarcel, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let tarcel = Tarcel::new()
        .with_log(OperationLog::new(Arc::clone(&sink)))
        .with_remote(RemoteStore::new(
            "tarballs",
            Arc::new(ObjectStoreClient::in_memory()),
        ));
    (tarcel, sink)
}

fn sample_tree(dir: &assert_fs::TempDir) -> std::result::Result<(), Box<dyn std::error::Error>> {
    dir.child("package.json").write_str("{\"name\":\"pkg\"}")?;
    dir.child("lib/index.js").write_str("module.exports = 1;\n")?;
    dir.child("lib/util/empty.js").touch()?;
    Ok(())
}

fn assert_same_file(left: &Path, right: &Path) {
    assert_eq!(fs::read(left).unwrap(), fs::read(right).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn pack_then_unpack_restores_the_tree() -> std::result::Result<(), Box<dyn std::error::Error>>
{
    let source = assert_fs::TempDir::new()?;
    sample_tree(&source)?;
    let work = assert_fs::TempDir::new()?;
    let tarball = work.path().join("pkg.tgz");
    let restored = work.path().join("restored");

    let (tarcel, sink) = tarcel_with_memory_store();
    tarcel.pack(source.path(), &tarball).await?;
    tarcel.unpack(&tarball, &restored).await?;

    assert_same_file(
        &source.path().join("package.json"),
        &restored.join("package.json"),
    );
    assert_same_file(
        &source.path().join("lib/index.js"),
        &restored.join("lib/index.js"),
    );
    assert!(restored.join("lib/util/empty.js").is_file());

    let pack_done = format!("Finished pack tarball for {}", source.path().display());
    assert!(sink.find(LogLevel::Info, &pack_done).is_some());
    assert!(
        sink.records()
            .iter()
            .all(|record| record.level == LogLevel::Info)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pack_of_missing_directory_is_blamed_on_archive() {
    let work = assert_fs::TempDir::new().unwrap();
    let missing = work.path().join("nope");
    let tarball = work.path().join("nope.tgz");

    let (tarcel, sink) = tarcel_with_memory_store();
    let err = tarcel.pack(&missing, &tarball).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.code().as_deref(), Some("2"));

    let record = sink
        .find(LogLevel::Error, "Error in archive operation")
        .expect("failure is logged");
    assert_eq!(record.field("stage"), Some("archive"));
    assert_eq!(record.field("message"), Some(err.to_string().as_str()));
    assert_eq!(record.field("kind"), Some("IOError"));
    assert_eq!(
        sink.records()
            .iter()
            .filter(|record| record.level == LogLevel::Error)
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unpack_of_garbage_is_blamed_on_decompress() {
    let work = assert_fs::TempDir::new().unwrap();
    let tarball = work.child("broken.tgz");
    tarball.write_str("this is not gzip at all").unwrap();

    let (tarcel, sink) = tarcel_with_memory_store();
    let err = tarcel
        .unpack(tarball.path(), work.path().join("out"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let record = sink
        .find(LogLevel::Error, "Error in decompress operation")
        .expect("failure is logged");
    assert_eq!(record.field("stage"), Some("decompress"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unpack_of_missing_tarball_is_blamed_on_read() {
    let work = assert_fs::TempDir::new().unwrap();

    let (tarcel, sink) = tarcel_with_memory_store();
    let err = tarcel
        .unpack(work.path().join("absent.tgz"), work.path().join("out"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(
        sink.find(LogLevel::Error, "Error in file.read operation")
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_download_exists_remove() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let source = assert_fs::TempDir::new()?;
    sample_tree(&source)?;
    let work = assert_fs::TempDir::new()?;
    let tarball = work.path().join("pkg-1.0.0.tgz");
    let fetched = work.path().join("fetched.tgz");

    let (tarcel, sink) = tarcel_with_memory_store();
    tarcel.pack(source.path(), &tarball).await?;

    assert_eq!(tarcel.upload("pkg-1.0.0.tgz", &tarball).await?, None);
    assert!(
        sink.find(LogLevel::Info, "Finished uploading tarball for package")
            .is_some()
    );
    assert!(tarcel.exists("pkg-1.0.0.tgz").await?);

    let downloaded = tarcel.download("pkg-1.0.0.tgz", &fetched).await?;
    assert_eq!(downloaded.name, "pkg-1.0.0.tgz");
    assert_eq!(downloaded.path, fetched);
    assert_same_file(&tarball, &fetched);
    let written = format!(
        "Finished downloading tarball and written to {}",
        fetched.display()
    );
    assert!(sink.find(LogLevel::Info, &written).is_some());

    tarcel.remove("pkg-1.0.0.tgz").await?;
    assert!(
        sink.find(LogLevel::Info, "Start to remove tarball pkg-1.0.0.tgz")
            .is_some()
    );
    assert!(
        sink.find(LogLevel::Info, "Tarball pkg-1.0.0.tgz is removed")
            .is_some()
    );
    assert!(!tarcel.exists("pkg-1.0.0.tgz").await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exists_on_missing_object_is_false() {
    let (tarcel, sink) = tarcel_with_memory_store();

    assert!(!tarcel.exists("missing.tgz").await.unwrap());
    let record = sink
        .find(
            LogLevel::Info,
            "tarball missing.tgz is not found in remote storage.",
        )
        .expect("lookup is logged");
    assert_eq!(record.field("filename"), Some("missing.tgz"));
    assert!(
        sink.find(
            LogLevel::Info,
            "Start to check the existence of tarball missing.tgz"
        )
        .is_some()
    );
    assert!(
        sink.records()
            .iter()
            .all(|record| record.level == LogLevel::Info)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn download_of_missing_object_is_blamed_on_remote() {
    let work = assert_fs::TempDir::new().unwrap();

    let (tarcel, sink) = tarcel_with_memory_store();
    let err = tarcel
        .download("missing.tgz", work.path().join("missing.tgz"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let record = sink
        .find(LogLevel::Error, "Error in remote.download operation")
        .expect("failure is logged");
    assert_eq!(record.field("stage"), Some("remote.download"));
    assert_eq!(record.field("filename"), Some("missing.tgz"));
}

/// Client whose every request fails with the configured error.
struct Refusing(fn() -> Error);

fn mock_error() -> Error {
    Error::transport("Mock Error")
}

#[async_trait]
impl ObjectClient for Refusing {
    async fn upload(&self, _local: &Path, _key: &str) -> Result<Option<String>> {
        Err((self.0)())
    }

    async fn download(&self, _key: &str) -> Result<ByteStream> {
        Err((self.0)())
    }

    async fn stat(&self, _key: &str) -> Result<ObjectInfo> {
        Err((self.0)())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err((self.0)())
    }
}

fn tarcel_with_client(client: Refusing) -> (Tarcel, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let tarcel = Tarcel::new()
        .with_log(OperationLog::new(Arc::clone(&sink)))
        .with_remote(RemoteStore::new("tarballs", Arc::new(client)));
    (tarcel, sink)
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_failure_is_logged_and_returned() {
    let work = assert_fs::TempDir::new().unwrap();
    let tarball = work.child("pkg.tgz");
    tarball.write_binary(b"\x1f\x8b").unwrap();

    let (tarcel, sink) = tarcel_with_client(Refusing(mock_error));

    let err = tarcel.upload("pkg.tgz", tarball.path()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.to_string(), "Mock Error");

    let record = sink
        .find(LogLevel::Error, "Failed to upload tarball for package")
        .expect("failure is logged");
    assert_eq!(record.field("message"), Some("Mock Error"));
    assert_eq!(record.field("stage"), Some("remote.upload"));
    assert!(
        sink.find(LogLevel::Info, "Start to upload tarball for package")
            .is_some()
    );

    let err = tarcel.remove("pkg.tgz").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(
        sink.find(
            LogLevel::Error,
            "Failed to remove the file from remote storage"
        )
        .is_some()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn exists_reports_backend_faults_as_transport() {
    let (tarcel, sink) =
        tarcel_with_client(Refusing(|| Error::Auth("token expired".to_string())));

    let err = tarcel.exists("pkg.tgz").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.to_string(), "token expired");

    assert!(
        sink.find(
            LogLevel::Info,
            "Start to check the existence of tarball pkg.tgz"
        )
        .is_some()
    );
    let record = sink
        .find(LogLevel::Error, "Failed to check the existence of the file")
        .expect("failure is logged");
    assert_eq!(record.field("stage"), Some("remote.stat"));
    assert_eq!(record.field("kind"), Some("TransportError"));
}

/// Deterministic bytes that gzip cannot shrink.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_gzip_body_is_blamed_on_decompress() {
    let source = assert_fs::TempDir::new().unwrap();
    source
        .child("big.bin")
        .write_binary(&noise(4 * 1024 * 1024))
        .unwrap();
    let work = assert_fs::TempDir::new().unwrap();
    let tarball = work.path().join("big.tgz");

    let (tarcel, _sink) = tarcel_with_memory_store();
    tarcel.pack(source.path(), &tarball).await.unwrap();

    let mut bytes = fs::read(&tarball).unwrap();
    let middle = bytes.len() / 2;
    for byte in &mut bytes[middle..middle + 64] {
        *byte = !*byte;
    }
    fs::write(&tarball, &bytes).unwrap();

    for round in 0..10 {
        let (tarcel, sink) = tarcel_with_memory_store();
        let err = tarcel
            .unpack(&tarball, work.path().join(format!("out-{round}")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);

        let record = sink
            .find(LogLevel::Error, "Error in decompress operation")
            .expect("failure is logged");
        assert_eq!(record.field("message"), Some(err.to_string().as_str()));
        assert!(
            sink.find(LogLevel::Error, "Error in extract operation")
                .is_none()
        );
    }
}

#[tokio::test]
async fn remote_operations_need_a_remote_store() {
    let sink = Arc::new(MemorySink::new());
    let tarcel = Tarcel::new().with_log(OperationLog::new(Arc::clone(&sink)));

    let err = tarcel.exists("pkg.tgz").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let record = sink
        .find(LogLevel::Error, "Remote storage is not configured")
        .expect("failure is logged");
    assert_eq!(record.field("stage"), Some("remote.stat"));
    assert_eq!(record.field("filename"), Some("pkg.tgz"));
    assert_eq!(record.field("kind"), Some("ConfigError"));
}
