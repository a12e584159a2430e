use crate::*;
use std::env::var;
use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default ceiling on a response frame (128 MiB)
pub const DEFAULT_MAX_RESPONSE: u32 = 128 * 1024 * 1024;

/// Default receive timeout, sized for bulk ballot generation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

/// Where the crypto backend listens
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Unix(PathBuf),
    Ipv4(SocketAddrV4),
    Ipv6(SocketAddrV6),
}

impl FromStr for Address {
    type Err = Error;

    /// `unix:<path>`, `ipv4:<ip>:<port>` or `ipv6:[<ip>]:<port>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidConfig(s.to_owned());

        let (family, rest) = match s.find(':') {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => return Err(bad()),
        };

        match family {
            "unix" if !rest.is_empty() => Ok(Address::Unix(PathBuf::from(rest))),
            "ipv4" => rest.parse().map(Address::Ipv4).map_err(|_| bad()),
            "ipv6" => rest.parse().map(Address::Ipv6).map_err(|_| bad()),
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
            Address::Ipv4(addr) => write!(f, "ipv4:{}", addr),
            Address::Ipv6(addr) => write!(f, "ipv6:{}", addr),
        }
    }
}

/// Transport client settings
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub address: Address,
    pub max_response: u32,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(address: Address) -> Self {
        ClientConfig {
            address,
            max_response: DEFAULT_MAX_RESPONSE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read `DEMOS_CRYPTO_ADDRESS`, `DEMOS_CRYPTO_MAX_RESPONSE` and
    /// `DEMOS_CRYPTO_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        let address: Address = match var("DEMOS_CRYPTO_ADDRESS") {
            Ok(val) => val.parse()?,
            Err(_e) => Address::Unix(PathBuf::from("/run/demos-crypto/demos-crypto.sock")),
        };

        let mut config = ClientConfig::new(address);

        if let Ok(val) = var("DEMOS_CRYPTO_MAX_RESPONSE") {
            config.max_response = val
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("DEMOS_CRYPTO_MAX_RESPONSE={}", val)))?;
        }
        if let Ok(val) = var("DEMOS_CRYPTO_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("DEMOS_CRYPTO_TIMEOUT_SECS={}", val)))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// A connected byte stream of either address family
pub(crate) enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    pub(crate) fn connect(address: &Address) -> Result<Self, Error> {
        let stream = match address {
            Address::Unix(path) => Stream::Unix(UnixStream::connect(path)?),
            Address::Ipv4(addr) => Stream::Tcp(TcpStream::connect(SocketAddr::V4(*addr))?),
            Address::Ipv6(addr) => Stream::Tcp(TcpStream::connect(SocketAddr::V6(*addr))?),
        };
        Ok(stream)
    }

    pub(crate) fn set_timeout(&self, timeout: Duration) -> Result<(), Error> {
        match self {
            Stream::Unix(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))?;
            }
            Stream::Tcp(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))?;
            }
        }
        Ok(())
    }

    /// Signal that no more requests follow on this connection
    pub(crate) fn shutdown_write(&self) -> Result<(), Error> {
        match self {
            Stream::Unix(s) => s.shutdown(Shutdown::Write)?,
            Stream::Tcp(s) => s.shutdown(Shutdown::Write)?,
        }
        Ok(())
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

/// Write `[u32 big-endian length][payload]`
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), Error> {
    if payload.len() > u32::MAX as usize {
        return Err(Error::SizeLimitExceeded(
            payload.len() as u64,
            u32::MAX as u64,
        ));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, refusing declared lengths above `max` before reading the body.
pub fn read_frame<R: Read>(reader: &mut R, max: u32) -> Result<Vec<u8>, Error> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len);

    if len == 0 {
        return Err(Error::MalformedMessage("empty frame".to_owned()));
    }
    if len > max {
        return Err(Error::SizeLimitExceeded(len as u64, max as u64));
    }

    // Grow with the data actually received rather than the declared length
    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len as usize {
        return Err(Error::ConnectionClosed);
    }

    Ok(payload)
}

/// One-shot request/response client for the crypto backend.
///
/// Every call opens a fresh connection; nothing is pooled or retried here.
#[derive(Clone, Debug)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one framed payload and wait for one framed response.
    #[instrument(level = "debug", skip(self, payload), fields(address = %self.config.address, len = payload.len()))]
    pub fn execute(&self, cmd: Command, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut stream = Stream::connect(&self.config.address)?;
        stream.set_timeout(self.config.timeout)?;

        write_frame(&mut stream, payload)?;
        stream.shutdown_write()?;

        let response = read_frame(&mut stream, self.config.max_response)?;
        debug!(cmd = %cmd, len = response.len(), "received response");

        Ok(response)
    }
}

impl Backend for Client {
    fn call(&self, request: Request) -> Result<Response, Error> {
        let cmd = request.command();
        let payload = codec::encode_request(&request)?;
        let response = self.execute(cmd, &payload)?;
        codec::decode_response(&response, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_addresses() {
        let unix: Address = "unix:/tmp/demos.sock".parse().unwrap();
        assert_eq!(unix, Address::Unix(PathBuf::from("/tmp/demos.sock")));

        let v4: Address = "ipv4:127.0.0.1:9000".parse().unwrap();
        assert_eq!(format!("{}", v4), "ipv4:127.0.0.1:9000");

        let v6: Address = "ipv6:[::1]:9000".parse().unwrap();
        assert_eq!(format!("{}", v6), "ipv6:[::1]:9000");

        assert!("unix:".parse::<Address>().is_err());
        assert!("ipv4:[::1]:9000".parse::<Address>().is_err());
        assert!("tcp:127.0.0.1:9000".parse::<Address>().is_err());
        assert!("nonsense".parse::<Address>().is_err());
    }

    #[test]
    fn frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);

        let payload = read_frame(&mut Cursor::new(buf), 1024).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn oversized_frame_is_refused() {
        // Declares 1 GiB but carries nothing
        let buf = (1u32 << 30).to_be_bytes().to_vec();
        match read_frame(&mut Cursor::new(buf), DEFAULT_MAX_RESPONSE) {
            Err(Error::SizeLimitExceeded(len, max)) => {
                assert_eq!(len, 1 << 30);
                assert_eq!(max, DEFAULT_MAX_RESPONSE as u64);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_frames() {
        // Length prefix cut off
        let buf = vec![0u8, 0];
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), 1024),
            Err(Error::ConnectionClosed)
        ));

        // Body cut off
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), 1024),
            Err(Error::ConnectionClosed)
        ));

        let buf = 0u32.to_be_bytes().to_vec();
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), 1024),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn refused_connection() {
        let path = std::env::temp_dir().join(format!("demos-crypto-{}.sock", uuid::Uuid::new_v4()));
        let client = Client::new(ClientConfig::new(Address::Unix(path)));
        assert!(matches!(
            client.execute(Command::KeyGen, b"x"),
            Err(Error::ConnectionRefused(_))
        ));
    }
}
