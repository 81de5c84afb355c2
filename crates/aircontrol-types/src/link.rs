//! Deep links that hand a phone the direct-connect parameters out of band.

use url::Url;

use crate::code::PairingCode;
use crate::error::TypesError;

/// `scheme://connect?ip=<IP>&port=<PORT>&code=<CODE>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink {
    pub scheme: String,
    pub ip: String,
    pub port: u16,
    pub code: PairingCode,
}

impl DeepLink {
    pub fn new(scheme: impl Into<String>, ip: impl Into<String>, port: u16, code: PairingCode) -> Self {
        Self {
            scheme: scheme.into(),
            ip: ip.into(),
            port,
            code,
        }
    }

    pub fn to_url(&self) -> Result<Url, TypesError> {
        let mut url = Url::parse(&format!("{}://connect", self.scheme))
            .map_err(|e| TypesError::InvalidDeepLink(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("ip", &self.ip)
            .append_pair("port", &self.port.to_string())
            .append_pair("code", self.code.as_str());
        Ok(url)
    }

    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let invalid = || TypesError::InvalidDeepLink(raw.to_string());
        let url = Url::parse(raw).map_err(|_| invalid())?;
        if url.host_str() != Some("connect") {
            return Err(invalid());
        }

        let mut ip = None;
        let mut port = None;
        let mut code = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "ip" => ip = Some(value.into_owned()),
                "port" => port = value.parse::<u16>().ok(),
                "code" => code = PairingCode::parse(&value).ok(),
                _ => {}
            }
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            ip: ip.filter(|ip| !ip.is_empty()).ok_or_else(invalid)?,
            port: port.ok_or_else(invalid)?,
            code: code.ok_or_else(invalid)?,
        })
    }
}

impl std::fmt::Display for DeepLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_url() {
            Ok(url) => f.write_str(url.as_str()),
            Err(_) => write!(
                f,
                "{}://connect?ip={}&port={}&code={}",
                self.scheme, self.ip, self.port, self.code
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> PairingCode {
        PairingCode::parse("042137").unwrap()
    }

    #[test]
    fn renders_connect_uri() {
        let link = DeepLink::new("aircontrol", "192.168.1.20", 8765, code());
        assert_eq!(
            link.to_string(),
            "aircontrol://connect?ip=192.168.1.20&port=8765&code=042137"
        );
    }

    #[test]
    fn parse_reads_back_rendered_link() {
        let link = DeepLink::new("aircontrol", "fe80::1%en0", 8765, code());
        let parsed = DeepLink::parse(&link.to_string()).unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(DeepLink::parse("aircontrol://connect?ip=10.0.0.2&port=8765").is_err());
        assert!(DeepLink::parse("aircontrol://pair?ip=10.0.0.2&port=8765&code=123456").is_err());
        assert!(DeepLink::parse("aircontrol://connect?ip=10.0.0.2&port=99999&code=123456").is_err());
        assert!(DeepLink::parse("not a link").is_err());
    }
}
