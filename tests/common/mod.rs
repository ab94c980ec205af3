// tests/common/mod.rs
//
// In-process stand-in for the S3 object API, enough for single-object
// transfers: PutObject, GetObject, HeadObject and the multipart calls.
// Path-style addressing only (`/bucket/key`). Serves plain TCP or, with
// `start_tls`, TLS using a throwaway self-signed certificate.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rcgen::CertifiedKey;
use rustls::ServerConfig;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use s3pin::{ConnectionConfig, RawConnectionSettings, StaticCredentials};

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub version: Version,
    pub path: String,
    pub query: HashMap<String, String>,
    pub host: Option<String>,
    pub body_len: usize,
}

impl RecordedRequest {
    pub fn is_upload_part(&self) -> bool {
        self.method == Method::PUT && self.query.contains_key("partNumber")
    }

    pub fn is_put_object(&self) -> bool {
        self.method == Method::PUT && !self.query.contains_key("uploadId")
    }
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, BTreeMap<u32, Vec<u8>>>,
    next_upload: u64,
    requests: Vec<RecordedRequest>,
}

/// Running mock server. Aborted on drop.
pub struct MockS3 {
    pub addr: SocketAddr,
    state: Arc<Mutex<State>>,
    hide_from_head: Arc<AtomicBool>,
    server: JoinHandle<()>,
}

impl MockS3 {
    pub async fn start() -> Self {
        Self::serve(None).await
    }

    /// Same store behind TLS, configured by `tls`.
    pub async fn start_tls(tls: Arc<ServerConfig>) -> Self {
        Self::serve(Some(TlsAcceptor::from(tls))).await
    }

    async fn serve(tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        let state = Arc::new(Mutex::new(State::default()));
        let hide_from_head = Arc::new(AtomicBool::new(false));

        let server = {
            let state = state.clone();
            let hide = hide_from_head.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let state = state.clone();
                    let hide = hide.clone();
                    let tls = tls.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle(state.clone(), hide.clone(), req));
                        let builder = auto::Builder::new(TokioExecutor::new());
                        match tls {
                            Some(acceptor) => {
                                // a rejected handshake just drops the connection
                                let Ok(stream) = acceptor.accept(stream).await else {
                                    return;
                                };
                                let _ = builder.serve_connection(TokioIo::new(stream), service).await;
                            }
                            None => {
                                let _ = builder.serve_connection(TokioIo::new(stream), service).await;
                            }
                        }
                    });
                }
            })
        };

        Self {
            addr,
            state,
            hide_from_head,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn put(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(format!("{bucket}/{key}"), data);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(&format!("{bucket}/{key}")).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    /// Answer every HeadObject with 404, as if the store were lagging.
    pub fn hide_from_head(&self, hide: bool) {
        self.hide_from_head.store(hide, Ordering::SeqCst);
    }
}

impl Drop for MockS3 {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Plain-HTTP config pointing straight at `mock`.
pub fn plain_config(mock: &MockS3) -> ConnectionConfig {
    ConnectionConfig::derive(&RawConnectionSettings {
        host_url: Some(mock.url()),
        buffer_size: 4096,
        ..Default::default()
    })
    .expect("mock config")
}

pub fn test_credentials() -> StaticCredentials {
    StaticCredentials::new("AKIDMOCK", "mock-secret")
}

/// Self-signed certificate for `server_name` plus a server config offering `alpn`.
pub struct TlsFixture {
    pub cert_pem: String,
    pub server: Arc<ServerConfig>,
}

pub fn tls_fixture(server_name: &str, alpn: &[&[u8]]) -> TlsFixture {
    let CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![server_name.to_string()]).expect("self-signed cert");
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut server = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("protocol versions")
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key.into())
        .expect("server cert");
    server.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    TlsFixture {
        cert_pem: cert.pem(),
        server: Arc::new(server),
    }
}

/// Collects formatted log output so tests can look at it.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or("")
        .split('&')
        .filter(|kv| !kv.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (kv.to_string(), String::new()),
        })
        .collect()
}

fn xml(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/xml")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn not_found(head: bool) -> Response<Full<Bytes>> {
    if head {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap();
    }
    xml(
        StatusCode::NOT_FOUND,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"
            .to_string(),
    )
}

fn etag_for(data: &[u8]) -> String {
    format!("\"{}\"", s3pin::digest::md5_hex(data))
}

async fn handle(
    state: Arc<Mutex<State>>,
    hide_from_head: Arc<AtomicBool>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let version = req.version();
    let path = req.uri().path().trim_start_matches('/').to_string();
    let query = parse_query(req.uri().query());
    // HTTP/2 carries the host as :authority rather than a Host header
    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()));
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(_) => Vec::new(),
    };

    let mut st = state.lock().unwrap();
    st.requests.push(RecordedRequest {
        method: method.clone(),
        version,
        path: path.clone(),
        query: query.clone(),
        host,
        body_len: body.len(),
    });

    let response = match method {
        Method::GET => match st.objects.get(&path) {
            Some(data) => Response::builder()
                .status(StatusCode::OK)
                .header("etag", etag_for(data))
                .body(Full::new(Bytes::from(data.clone())))
                .unwrap(),
            None => not_found(false),
        },

        Method::HEAD => match st.objects.get(&path) {
            Some(data) if !hide_from_head.load(Ordering::SeqCst) => Response::builder()
                .status(StatusCode::OK)
                .header("etag", etag_for(data))
                .body(Full::new(Bytes::new()))
                .unwrap(),
            _ => not_found(true),
        },

        Method::PUT => {
            if let (Some(part), Some(upload_id)) = (query.get("partNumber"), query.get("uploadId")) {
                let part: u32 = part.parse().unwrap_or(0);
                let etag = etag_for(&body);
                match st.uploads.get_mut(upload_id) {
                    Some(parts) => {
                        parts.insert(part, body);
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("etag", etag)
                            .body(Full::new(Bytes::new()))
                            .unwrap()
                    }
                    None => not_found(false),
                }
            } else {
                let etag = etag_for(&body);
                st.objects.insert(path, body);
                Response::builder()
                    .status(StatusCode::OK)
                    .header("etag", etag)
                    .body(Full::new(Bytes::new()))
                    .unwrap()
            }
        }

        Method::POST if query.contains_key("uploads") => {
            st.next_upload += 1;
            let upload_id = format!("upload-{}", st.next_upload);
            st.uploads.insert(upload_id.clone(), BTreeMap::new());
            let (bucket, key) = path.split_once('/').unwrap_or((path.as_str(), ""));
            xml(
                StatusCode::OK,
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <InitiateMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                     <Bucket>{bucket}</Bucket><Key>{key}</Key><UploadId>{upload_id}</UploadId>\
                     </InitiateMultipartUploadResult>"
                ),
            )
        }

        Method::POST if query.contains_key("uploadId") => {
            let upload_id = &query["uploadId"];
            match st.uploads.remove(upload_id) {
                Some(parts) => {
                    let data: Vec<u8> = parts.into_values().flatten().collect();
                    let etag = etag_for(&data);
                    st.objects.insert(path.clone(), data);
                    let (bucket, key) = path.split_once('/').unwrap_or((path.as_str(), ""));
                    xml(
                        StatusCode::OK,
                        format!(
                            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                             <CompleteMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                             <Bucket>{bucket}</Bucket><Key>{key}</Key><ETag>{etag}</ETag>\
                             </CompleteMultipartUploadResult>"
                        ),
                    )
                }
                None => not_found(false),
            }
        }

        Method::DELETE if query.contains_key("uploadId") => {
            st.uploads.remove(&query["uploadId"]);
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }

        _ => xml(
            StatusCode::NOT_IMPLEMENTED,
            "<Error><Code>NotImplemented</Code></Error>".to_string(),
        ),
    };
    Ok(response)
}
