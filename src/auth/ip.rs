//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::request::Parts};

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Header set by a trusted reverse proxy carrying the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`, first entry
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
    /// `CF-Connecting-IP`
    CfConnectingIp,
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        }
    }

    fn parse(&self, value: &str) -> Result<String, &'static str> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.split(',').next().unwrap_or(value),
            ClientIpHeader::XRealIp | ClientIpHeader::CfConnectingIp => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

/// Extract client IP address.
///
/// If `ip_header` is set, reads the configured header and returns an error
/// if it is missing or invalid (does NOT fall back to the socket address).
/// Otherwise uses the SocketAddr from ConnectInfo.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_header: Option<ClientIpHeader>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(header) => {
            let value = source
                .headers()
                .get(header.header_name())
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            header.parse(value)
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}
