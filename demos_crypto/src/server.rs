use crate::transport::{read_frame, write_frame, Stream};
use crate::*;
use std::fs;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::net::UnixListener;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default ceiling on a request frame (16 MiB)
pub const DEFAULT_MAX_REQUEST: u32 = 16 * 1024 * 1024;

/// Default per-connection socket timeout
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: Address,
    pub workers: usize,
    pub max_request: u32,
    /// Most ballot parts a single GenBallot request may ask for
    pub max_ballot_parts: u32,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(address: Address) -> Self {
        ServerConfig {
            address,
            workers: rayon::current_num_threads(),
            max_request: DEFAULT_MAX_REQUEST,
            max_ballot_parts: MAX_BALLOT_PARTS,
            timeout: DEFAULT_SERVER_TIMEOUT,
        }
    }
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    fn accept(&self) -> std::io::Result<Stream> {
        match self {
            Listener::Unix(l) => l.accept().map(|(s, _)| Stream::Unix(s)),
            Listener::Tcp(l) => l.accept().map(|(s, _)| Stream::Tcp(s)),
        }
    }
}

/// Crypto backend: one framed request and one framed response per connection,
/// served by a fixed pool of worker threads.
pub struct Server {
    listener: Listener,
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl Server {
    /// Bind the listening socket. A stale unix socket file is removed first.
    pub fn bind(config: ServerConfig) -> Result<Self, Error> {
        let listener = match &config.address {
            Address::Unix(path) => {
                match fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale socket"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
                Listener::Unix(UnixListener::bind(path).map_err(Error::Io)?)
            }
            Address::Ipv4(addr) => {
                Listener::Tcp(TcpListener::bind(SocketAddr::V4(*addr)).map_err(Error::Io)?)
            }
            Address::Ipv6(addr) => {
                Listener::Tcp(TcpListener::bind(SocketAddr::V6(*addr)).map_err(Error::Io)?)
            }
        };

        let dispatcher = Dispatcher::with_max_parts(config.max_ballot_parts);
        Ok(Server {
            listener,
            config,
            dispatcher,
        })
    }

    /// The bound address, with the real port when bound to port 0
    pub fn local_address(&self) -> Result<Address, Error> {
        match &self.listener {
            Listener::Unix(_) => Ok(self.config.address.clone()),
            Listener::Tcp(l) => match l.local_addr().map_err(Error::Io)? {
                SocketAddr::V4(addr) => Ok(Address::Ipv4(addr)),
                SocketAddr::V6(addr) => Ok(Address::Ipv6(addr)),
            },
        }
    }

    /// Accept connections until the listener fails.
    pub fn serve(self) -> Result<(), Error> {
        let (sender, receiver) = channel::<Stream>();
        let receiver = Arc::new(Mutex::new(receiver));

        for n in 0..self.config.workers.max(1) {
            let receiver = receiver.clone();
            let dispatcher = self.dispatcher;
            let max_request = self.config.max_request;
            thread::Builder::new()
                .name(format!("demos-cryptod-{}", n))
                .spawn(move || worker(receiver, dispatcher, max_request))
                .map_err(Error::Io)?;
        }

        info!(
            address = %self.config.address,
            workers = self.config.workers,
            "crypto backend listening"
        );

        loop {
            let stream = match self.listener.accept() {
                Ok(stream) => stream,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return Err(Error::Io(e));
                }
            };

            if let Err(e) = stream.set_timeout(self.config.timeout) {
                warn!(error = %e, "dropping connection");
                continue;
            }

            // Workers only exit when the channel closes
            if sender.send(stream).is_err() {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

fn worker(receiver: Arc<Mutex<Receiver<Stream>>>, dispatcher: Dispatcher, max_request: u32) {
    loop {
        let next = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let mut stream = match next {
            Ok(stream) => stream,
            Err(_) => return,
        };

        if let Err(e) = handle_connection(&mut stream, &dispatcher, max_request) {
            warn!(error = %e, "connection dropped");
        }
    }
}

fn handle_connection(
    stream: &mut Stream,
    dispatcher: &Dispatcher,
    max_request: u32,
) -> Result<(), Error> {
    let request = read_frame(stream, max_request)?;
    let response = dispatcher.handle(&request)?;
    write_frame(stream, &response)?;
    debug!(request = request.len(), response = response.len(), "served");
    Ok(())
}
