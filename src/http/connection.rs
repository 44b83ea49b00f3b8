//! Per-connection request handling.
//!
//! An [`Exchange`] is built once the request head is assembled and lives
//! until the response is sent. It dispatches by method and is also the
//! handle request-notify handlers use to read content and answer.

use std::net::SocketAddr;

use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::auth::digest::{self, DigestAuthorization, DigestInput};
use crate::auth::{AuthDecision, Credentials, NonceTable, basic, compare};
use crate::error::{HttpError, Result};
use crate::http::mime::{DEFAULT_MIME, mime_type, mime_type_checked};
use crate::http::multipart::{EntityHeaderScan, MultipartContext, Scan, Span};
use crate::http::request::{Method, Request};
use crate::http::response::{HeaderContext, ResponseHeader, StatusCode, checked_text};
use crate::http::segment::{Segment, SegmentChain, SegmentPool};
use crate::http::writer::ResponseWriter;
use crate::server::callbacks::{Callbacks, DigestCheckParams, NotifyOutcome};
use crate::server::{ServerSettings, ServerStats};
use crate::store::{FileStore, OpenMode};
use crate::transport::Transport;

/// One request being served.
pub struct Exchange<'e, T: Transport> {
    pub(crate) transport: &'e mut T,
    pub(crate) store: &'e dyn FileStore,
    pub(crate) pool: &'e SegmentPool,
    pub(crate) settings: &'e ServerSettings,
    pub(crate) callbacks: &'e Callbacks<T>,
    pub(crate) stats: &'e mut ServerStats,
    pub(crate) nonces: &'e mut NonceTable,
    pub(crate) rng: &'e mut dyn RngCore,
    pub(crate) peer: SocketAddr,
    pub(crate) request: Request,
    pub(crate) resource: String,
    pub(crate) multipart: MultipartContext,
    pub(crate) response_started: bool,
}

impl<'e, T: Transport> Exchange<'e, T> {
    pub fn method(&self) -> Option<Method> {
        self.request.method
    }

    /// Decoded resource path; empty until the request line has been parsed.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    fn writer(&mut self) -> ResponseWriter<'_, T> {
        self.response_started = true;
        ResponseWriter::new(
            self.transport,
            self.pool,
            self.settings.send_timeout,
            self.stats,
        )
    }

    fn header_context(&self) -> HeaderContext<'_> {
        HeaderContext {
            gmt: self.callbacks.gmt.as_deref(),
            cache: self.callbacks.cache.as_deref(),
            method: self.request.method,
            resource: &self.resource,
        }
    }

    /// Runs the request to completion. Errors end in a best-effort status
    /// response when nothing has been sent yet.
    pub async fn process(&mut self) {
        let result = match self.request.method {
            Some(method @ (Method::GET | Method::HEAD | Method::POST)) => self.get_process(method).await,
            Some(Method::PUT) => self.put_process().await,
            Some(Method::DELETE) => self.delete_process().await,
            None => {
                self.send_response(StatusCode::NotImplemented.as_str(), "Request Not Implemented", None)
                    .await
            }
        };

        if let Err(err) = result {
            self.fail(err).await;
        }
    }

    async fn fail(&mut self, err: HttpError) {
        if matches!(err, HttpError::Allocation) {
            self.stats.allocation_errors += 1;
        }

        let Some(status) = err.status() else {
            debug!(peer = %self.peer, error = %err, "request ended");
            return;
        };
        if self.response_started {
            warn!(peer = %self.peer, error = %err, "request failed after response started");
            return;
        }

        warn!(peer = %self.peer, resource = %self.resource, error = %err, status = status.as_u16(), "request failed");
        if let Err(e) = self
            .send_response(status.as_str(), status.reason_phrase(), None)
            .await
        {
            debug!(error = %e, "error response not sent");
        }
    }

    fn parse_resource(&mut self) -> Result<()> {
        self.resource = self.request.resource(self.settings.max_resource)?;
        Ok(())
    }

    async fn notify(&mut self, method: Method) -> Result<NotifyOutcome> {
        let callbacks = self.callbacks;
        match &callbacks.request_notify {
            Some(handler) => handler.notify(self, method).await,
            None => Ok(NotifyOutcome::Continue),
        }
    }

    async fn get_process(&mut self, method: Method) -> Result<()> {
        self.parse_resource()?;
        self.authenticate(method).await?;

        if method == Method::GET && self.not_modified() {
            let header = ResponseHeader::new(StatusCode::NotModified.as_str());
            let chain = header.into_segments(self.pool, &self.header_context())?;
            return self.send_segments(chain).await;
        }

        match self.notify(method).await? {
            NotifyOutcome::Continue => {}
            NotifyOutcome::Completed | NotifyOutcome::Aborted => return Ok(()),
        }

        let size = self.store.stat(&self.resource).map_err(HttpError::from_store)?;
        let mut file = self
            .store
            .open(&self.resource, OpenMode::Read)
            .map_err(HttpError::from_store)?;

        let callbacks = self.callbacks;
        let content_type = mime_type(&self.resource, &callbacks.mime_maps);
        let header = ResponseHeader::new(StatusCode::Ok.as_str())
            .content_type(content_type)
            .content_length(size);
        let chain = header.into_segments(self.pool, &self.header_context())?;
        self.send_segments(chain).await?;

        if method == Method::HEAD {
            return Ok(());
        }

        let pool = self.pool;
        let mut writer = self.writer();
        let chunk = writer.chunk_size();
        let mut sent = 0u64;
        loop {
            let mut segment = pool.allocate()?;
            let buf = segment.begin_fill();
            let limit = chunk.min(buf.len());
            let n = file.read(&mut buf[..limit]).map_err(HttpError::from_store)?;
            segment.finish_fill(0, n);
            if n == 0 {
                break;
            }
            sent += n as u64;
            let mut chain = SegmentChain::new();
            chain.push(segment);
            writer.send_segments(chain).await?;
        }
        trace!(resource = %self.resource, bytes = sent, "file sent");
        Ok(())
    }

    /// True when If-Modified-Since equals the resource's Last-Modified date.
    fn not_modified(&self) -> bool {
        let Some(cache) = self.callbacks.cache.as_deref() else {
            return false;
        };
        let Ok(since) = self
            .request
            .header("If-Modified-Since", self.settings.max_header_field)
        else {
            return false;
        };
        cache
            .cache_info(&self.resource)
            .is_some_and(|entry| entry.last_modified.to_string() == since)
    }

    async fn put_process(&mut self) -> Result<()> {
        self.parse_resource()?;
        self.authenticate(Method::PUT).await?;

        let length = self.request.content_length_checked()?;
        if length == 0 {
            return Err(HttpError::Protocol("PUT without content"));
        }

        match self.notify(Method::PUT).await? {
            NotifyOutcome::Continue => {}
            NotifyOutcome::Completed | NotifyOutcome::Aborted => return Ok(()),
        }

        let mut file = self
            .store
            .open(&self.resource, OpenMode::Write)
            .map_err(HttpError::from_store)?;

        let start = self.request.content_offset();
        let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX));
        let mut written = 0u64;
        for slice in self.request.chain().slices(start, end) {
            file.write(slice).map_err(HttpError::from_store)?;
            written += slice.len() as u64;
        }

        while written < length {
            let segment = self.receive_segment().await?;
            let take = segment.len().min(usize::try_from(length - written).unwrap_or(usize::MAX));
            file.write(&segment.as_slice()[..take])
                .map_err(HttpError::from_store)?;
            written += take as u64;
        }
        file.close().map_err(HttpError::from_store)?;
        debug!(resource = %self.resource, bytes = written, "resource stored");

        self.send_response(StatusCode::Ok.as_str(), "", None).await
    }

    async fn delete_process(&mut self) -> Result<()> {
        self.parse_resource()?;
        self.authenticate(Method::DELETE).await?;

        match self.notify(Method::DELETE).await? {
            NotifyOutcome::Continue => {}
            NotifyOutcome::Completed | NotifyOutcome::Aborted => return Ok(()),
        }

        self.store
            .delete(&self.resource)
            .map_err(HttpError::from_store)?;
        debug!(resource = %self.resource, "resource deleted");
        self.send_response(StatusCode::Ok.as_str(), "", None).await
    }

    /// Returns `Ok` when the request may proceed; a sent challenge ends it
    /// with [`HttpError::AuthPending`].
    async fn authenticate(&mut self, method: Method) -> Result<()> {
        let callbacks = self.callbacks;
        let Some(check) = callbacks.authentication_check.as_deref() else {
            return Ok(());
        };

        let authorization = self
            .request
            .header("Authorization", digest::MAX_AUTHORIZATION)
            .ok();

        let challenge = match check.check(method, &self.resource) {
            AuthDecision::NoAuthRequired => return Ok(()),
            AuthDecision::Basic(credentials) => {
                if authorization
                    .as_deref()
                    .is_some_and(|value| basic::verify(value, &credentials))
                {
                    return Ok(());
                }
                basic::challenge(&credentials.realm)
            }
            AuthDecision::Digest(credentials) => {
                if let Some(auth) = authorization
                    .as_deref()
                    .and_then(DigestAuthorization::parse)
                    .filter(|auth| auth.within_limits(self.settings.max_resource))
                {
                    if self.verify_digest(method, &auth, &credentials) {
                        return Ok(());
                    }
                }
                let nonce = self
                    .nonces
                    .allocate(&mut *self.rng)
                    .ok_or_else(|| HttpError::Internal("nonce table exhausted".to_string()))?
                    .to_string();
                digest::challenge(&credentials.realm, &nonce)
            }
        };

        if authorization.is_some() {
            debug!(peer = %self.peer, resource = %self.resource, "credentials rejected");
            if let Some(notify) = callbacks.invalid_credentials.as_deref() {
                notify.notify(method, &self.resource, self.peer);
            }
        }

        self.send_response(StatusCode::Unauthorized.as_str(), "", Some(&challenge))
            .await?;
        Err(HttpError::AuthPending)
    }

    fn verify_digest(&mut self, method: Method, auth: &DigestAuthorization, credentials: &Credentials) -> bool {
        let Some(index) = self.nonces.find(&auth.nonce) else {
            return false;
        };

        let expected = digest::expected_response(&DigestInput {
            name: &credentials.name,
            realm: &credentials.realm,
            password: &credentials.password,
            method,
            uri: &auth.uri,
            nonce: &auth.nonce,
            nc: &auth.nc,
            cnonce: &auth.cnonce,
        });

        let matched = compare(expected.as_bytes(), auth.response.as_bytes()).equal
            && self.callbacks.digest_check.as_deref().is_none_or(|check| {
                check.check(&DigestCheckParams {
                    name: &credentials.name,
                    realm: &credentials.realm,
                    password: &credentials.password,
                    method,
                    uri: &auth.uri,
                    nc: &auth.nc,
                    cnonce: &auth.cnonce,
                })
            });

        if matched {
            self.nonces.accept(index);
        } else {
            self.nonces.invalidate(index);
        }
        matched
    }

    /// Sends a complete response with `information` as a plain-text body.
    ///
    /// `additional_header` is raw header text, each line ending in CRLF.
    pub async fn send_response(
        &mut self,
        status: &str,
        information: &str,
        additional_header: Option<&str>,
    ) -> Result<()> {
        let mut header = ResponseHeader::new(status)
            .content_type(DEFAULT_MIME)
            .content_length(information.len() as u64);
        if let Some(additional) = additional_header {
            header = header.additional(additional);
        }

        let mut chain = header.into_segments(self.pool, &self.header_context())?;
        self.pool.append(&mut chain, information.as_bytes())?;
        self.send_segments(chain).await
    }

    /// [`send_response`](Self::send_response) with caller-declared lengths.
    pub async fn send_response_extended(
        &mut self,
        status: &str,
        status_len: usize,
        information: &str,
        information_len: usize,
        additional_header: Option<(&str, usize)>,
    ) -> Result<()> {
        let status = checked_text(status, status_len)?;
        let information = checked_text(information, information_len)?;
        let additional = additional_header
            .map(|(text, len)| checked_text(text, len))
            .transpose()?;
        self.send_response(status, information, additional).await
    }

    /// Sends raw body bytes in MSS-sized segments.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.writer().send_data(data).await
    }

    /// Renders a response header into pool segments for [`send_segments`](Self::send_segments).
    pub fn generate_response_header(
        &self,
        status: &str,
        content_length: u64,
        content_type: Option<&str>,
        additional_header: Option<&str>,
    ) -> Result<SegmentChain> {
        let mut header = ResponseHeader::new(status).content_length(content_length);
        if let Some(content_type) = content_type {
            header = header.content_type(content_type);
        }
        if let Some(additional) = additional_header {
            header = header.additional(additional);
        }
        header.into_segments(self.pool, &self.header_context())
    }

    /// [`generate_response_header`](Self::generate_response_header) with declared lengths.
    pub fn generate_response_header_extended(
        &self,
        status: (&str, usize),
        content_length: u64,
        content_type: Option<(&str, usize)>,
        additional_header: Option<(&str, usize)>,
    ) -> Result<SegmentChain> {
        let status = checked_text(status.0, status.1)?;
        let content_type = content_type
            .map(|(text, len)| checked_text(text, len))
            .transpose()?;
        let additional = additional_header
            .map(|(text, len)| checked_text(text, len))
            .transpose()?;
        self.generate_response_header(status, content_length, content_type, additional)
    }

    pub async fn send_segments(&mut self, chain: SegmentChain) -> Result<()> {
        self.writer().send_segments(chain).await
    }

    /// Receives the next raw segment of the connection.
    pub async fn receive_segment(&mut self) -> Result<Segment> {
        let segment = self.transport.receive(self.settings.receive_timeout).await?;
        self.stats.total_bytes_received += segment.len() as u64;
        Ok(segment)
    }

    /// Receives a segment and keeps it at the end of the request chain.
    async fn receive_content(&mut self) -> Result<()> {
        if self.request.content_received() as u64 >= self.request.content_length() {
            return Err(HttpError::DataEnd);
        }
        let segment = self.receive_segment().await?;
        self.request.chain_mut().push(segment);
        Ok(())
    }

    /// Content-Length, 0 when absent or malformed.
    pub fn content_length(&self) -> u64 {
        self.request.content_length()
    }

    pub fn content_length_checked(&self) -> Result<u64> {
        self.request.content_length_checked()
    }

    /// Makes sure some content is present and returns the content length.
    pub async fn packet_content_find(&mut self) -> Result<u64> {
        let length = self.request.content_length_checked()?;
        while length > 0 && self.request.content_received() == 0 {
            self.receive_content().await?;
        }
        Ok(length)
    }

    /// Copies request content starting at content offset `offset` into `dst`.
    ///
    /// Receives more segments when `offset` is beyond what has arrived.
    /// Fails with [`HttpError::DataEnd`] once `offset` reaches the content length.
    pub async fn content_get(&mut self, offset: u64, dst: &mut [u8]) -> Result<usize> {
        let length = self.request.content_length_checked()?;
        if offset >= length {
            return Err(HttpError::DataEnd);
        }

        let start = self
            .request
            .content_offset()
            .saturating_add(usize::try_from(offset).map_err(|_| HttpError::DataEnd)?);
        if start < self.request.chain().retained_start() {
            return Err(HttpError::DataEnd);
        }
        while self.request.chain().len() <= start {
            self.receive_content().await?;
        }

        let want = dst.len().min(usize::try_from(length - offset).unwrap_or(usize::MAX));
        Ok(self.request.chain().copy_to(start, &mut dst[..want]))
    }

    /// Copies the header lines of the next multipart part into `buf`.
    ///
    /// Returns `None` once the closing boundary has been read.
    pub async fn get_entity_header(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.multipart.ensure_boundary(
            self.request.head(),
            self.request.content_offset(),
            self.settings.max_header_field,
        )?;

        loop {
            match self.multipart.read_entity_header(self.request.chain(), buf)? {
                EntityHeaderScan::Complete(len) => return Ok(Some(len)),
                EntityHeaderScan::Closing => return Ok(None),
                EntityHeaderScan::NeedMore => self.receive_multipart().await?,
            }
        }
    }

    /// Locates the next run of the current part's content.
    ///
    /// Fails with [`HttpError::BoundaryAlreadyFound`] once the part's last
    /// run has been returned. Read the bytes with [`entity_bytes`](Self::entity_bytes).
    pub async fn get_entity_content(&mut self) -> Result<Span> {
        self.multipart.ensure_boundary(
            self.request.head(),
            self.request.content_offset(),
            self.settings.max_header_field,
        )?;

        loop {
            match self.multipart.find_content(self.request.chain())? {
                Scan::Available(span) => return Ok(span),
                Scan::NeedMore => self.receive_multipart().await?,
            }
        }
    }

    /// The bytes of a span returned by [`get_entity_content`](Self::get_entity_content).
    pub fn entity_bytes(&self, span: Span) -> &[u8] {
        let chain = self.request.chain();
        match chain.locate(span.offset) {
            Some((index, inner)) => chain
                .segment(index)
                .map(|segment| {
                    let bytes = segment.as_slice();
                    &bytes[inner..(inner + span.length).min(bytes.len())]
                })
                .unwrap_or(&[]),
            None => &[],
        }
    }

    /// Releases consumed multipart segments, then receives the next one.
    async fn receive_multipart(&mut self) -> Result<()> {
        let keep_from = self.multipart.retained_from();
        self.request.chain_mut().release_before(keep_from);
        self.receive_content().await
    }

    pub fn param(&self, index: usize, max_size: usize) -> Result<String> {
        self.request.param(index, max_size)
    }

    pub fn query(&self, index: usize, max_size: usize) -> Result<String> {
        self.request.query(index, max_size)
    }

    pub fn field_value(&self, name: &str, max_size: usize) -> Result<String> {
        self.request.header(name, max_size)
    }

    /// MIME type of `name`, using the server's additional maps first.
    pub fn mime_type(&self, name: &str) -> &str {
        mime_type(name, &self.callbacks.mime_maps)
    }

    pub fn mime_type_extended(&self, name: &str, name_len: usize) -> Result<&str> {
        mime_type_checked(name, name_len, &self.callbacks.mime_maps)
    }
}
