// tests/test_tls.rs
//
// Transfers over the TLS dialer against a store with a self-signed certificate.

mod common;

use std::path::PathBuf;

use anyhow::{Result, ensure};
use hyper::Version;

use common::{MockS3, TlsFixture, test_credentials, tls_fixture};
use s3pin::digest::md5_hex;
use s3pin::{
    ConnectionConfig, RawConnectionSettings, TransferError, TransferProgress, TransferRequest,
    UploadSource, download_object, upload_object,
};

const STORE_NAME: &str = "store.example";

fn tls_config(mock: &MockS3, ca_file: Option<PathBuf>, skip_verify: bool) -> ConnectionConfig {
    ConnectionConfig::derive(&RawConnectionSettings {
        host_url: Some(format!("https://{STORE_NAME}:{}", mock.addr.port())),
        address: Some(mock.addr.to_string()),
        ca_file,
        skip_verify,
        buffer_size: 4096,
        ..Default::default()
    })
    .expect("tls config")
}

fn write_ca(fixture: &TlsFixture) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, fixture.cert_pem.as_bytes())?;
    Ok(file)
}

async fn fetch(config: &ConnectionConfig, key: &str) -> s3pin::Result<s3pin::TransferResult> {
    download_object(
        config,
        &test_credentials(),
        &TransferRequest::new("bucket", key).with_buffer_size(config.buffer_size),
        &TransferProgress::hidden(),
    )
    .await
}

#[tokio::test]
async fn ca_file_trusts_a_private_store() -> Result<()> {
    let fixture = tls_fixture(STORE_NAME, &[b"http/1.1"]);
    let mock = MockS3::start_tls(fixture.server.clone()).await;
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    mock.put("bucket", "k", data.clone());
    let ca = write_ca(&fixture)?;

    let result = fetch(&tls_config(&mock, Some(ca.path().to_path_buf()), false), "k").await?;

    ensure!(result.bytes_transferred == 50_000, "got {} bytes", result.bytes_transferred);
    assert_eq!(result.digest_hex, md5_hex(&data));
    let reqs = mock.requests();
    assert_eq!(reqs[0].version, Version::HTTP_11);
    assert_eq!(reqs[0].path, "bucket/k");
    let expected_host = format!("{STORE_NAME}:{}", mock.addr.port());
    assert_eq!(reqs[0].host.as_deref(), Some(expected_host.as_str()));
    Ok(())
}

#[tokio::test]
async fn skip_verify_accepts_an_unknown_certificate() -> Result<()> {
    let fixture = tls_fixture(STORE_NAME, &[b"http/1.1"]);
    let mock = MockS3::start_tls(fixture.server.clone()).await;
    mock.put("bucket", "k", b"hello world".to_vec());

    let result = fetch(&tls_config(&mock, None, true), "k").await?;

    assert_eq!(result.bytes_transferred, 11);
    assert_eq!(result.digest_hex, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    Ok(())
}

#[tokio::test]
async fn untrusted_certificate_is_a_handshake_error() {
    let fixture = tls_fixture(STORE_NAME, &[b"http/1.1"]);
    let mock = MockS3::start_tls(fixture.server.clone()).await;
    mock.put("bucket", "k", b"never served".to_vec());

    let err = fetch(&tls_config(&mock, None, false), "k").await.unwrap_err();

    assert!(matches!(err, TransferError::Handshake(_)), "{err:?}");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn h2_is_used_when_the_store_selects_it() -> Result<()> {
    let fixture = tls_fixture(STORE_NAME, &[b"h2", b"http/1.1"]);
    let mock = MockS3::start_tls(fixture.server.clone()).await;
    let ca = write_ca(&fixture)?;
    let config = tls_config(&mock, Some(ca.path().to_path_buf()), false);

    let up = upload_object(
        &config,
        &test_credentials(),
        &TransferRequest::new("bucket", "over-h2"),
        &UploadSource::Random {
            size: 200_000,
            seed: Some(21),
        },
        &s3pin::UploadOptions {
            existence_wait: std::time::Duration::from_millis(300),
            poll_interval: std::time::Duration::from_millis(100),
            ..Default::default()
        },
        &TransferProgress::hidden(),
    )
    .await?;
    let down = fetch(&config, "over-h2").await?;

    assert_eq!(down.bytes_transferred, 200_000);
    assert_eq!(down.digest_hex, up.digest_hex);
    let reqs = mock.requests();
    ensure!(!reqs.is_empty(), "store saw no requests");
    assert!(reqs.iter().all(|r| r.version == Version::HTTP_2), "{reqs:?}");
    Ok(())
}
