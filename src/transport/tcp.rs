use super::{ProbedStream, TransportError, TransportInfo};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr};
use tracing::debug;

/// Outbound TCP connection with a fixed congestion-control algorithm
///
/// The socket is closed when the probe is dropped, so every exit path of a
/// run releases it.
pub struct TcpProbe {
    socket: Socket,
    peer: SocketAddr,
    congestion_control: String,
}

impl TcpProbe {
    /// Create a socket, select `congestion_control` on it and connect
    ///
    /// The algorithm is set before `connect` so the handshake already runs
    /// under it. Both an unknown algorithm (`ENOENT`) and one the caller is
    /// not allowed to use (`EPERM`) surface as
    /// [`TransportError::CongestionControl`].
    pub fn connect(addr: SocketAddr, congestion_control: &str) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(TransportError::Socket)?;

        set_congestion_control(&socket, congestion_control)?;
        debug!("Congestion control set to '{}'", congestion_control);

        socket
            .connect(&SockAddr::from(addr))
            .map_err(|source| TransportError::Connect { addr, source })?;

        let probe = Self {
            socket,
            peer: addr,
            congestion_control: congestion_control.to_string(),
        };

        match probe.active_congestion_control() {
            Ok(active) => debug!("Connected to {} using '{}'", addr, active),
            Err(e) => debug!("Connected to {} (could not read back algorithm: {})", addr, e),
        }
        Ok(probe)
    }

    /// Address of the receiver
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Algorithm requested at setup
    pub fn congestion_control(&self) -> &str {
        &self.congestion_control
    }

    /// Algorithm the kernel reports as active on the socket
    pub fn active_congestion_control(&self) -> Result<String, TransportError> {
        get_congestion_control(&self.socket)
    }
}

impl ProbedStream for TcpProbe {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn transport_info(&self) -> Result<TransportInfo, TransportError> {
        query_tcp_info(&self.socket)
    }

    fn close(self) -> Result<(), TransportError> {
        match self.socket.shutdown(Shutdown::Write) {
            Ok(()) => {}
            // The receiver already went away; the data was handed over.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => return Err(TransportError::Socket(e)),
        }
        debug!("Closed connection to {}", self.peer);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn set_congestion_control(socket: &Socket, name: &str) -> Result<(), TransportError> {
    socket
        .set_tcp_congestion(name.as_bytes())
        .map_err(|source| TransportError::CongestionControl {
            name: name.to_string(),
            source,
        })
}

#[cfg(not(target_os = "linux"))]
fn set_congestion_control(_socket: &Socket, _name: &str) -> Result<(), TransportError> {
    Err(TransportError::Unsupported("TCP_CONGESTION"))
}

#[cfg(target_os = "linux")]
fn get_congestion_control(socket: &Socket) -> Result<String, TransportError> {
    let raw = socket.tcp_congestion().map_err(TransportError::Socket)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

#[cfg(not(target_os = "linux"))]
fn get_congestion_control(_socket: &Socket) -> Result<String, TransportError> {
    Err(TransportError::Unsupported("TCP_CONGESTION"))
}

#[cfg(target_os = "linux")]
fn query_tcp_info(socket: &Socket) -> Result<TransportInfo, TransportError> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: tcp_info is plain old data; all-zero is a valid value.
    let mut info: libc::tcp_info = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::tcp_info>() as libc::socklen_t;

    // SAFETY: the pointer and length describe `info`, which outlives the call.
    let rc = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            libc::SOL_TCP,
            libc::TCP_INFO,
            &mut info as *mut libc::tcp_info as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(TransportError::Diagnostics(io::Error::last_os_error()));
    }

    Ok(TransportInfo {
        rtt_us: info.tcpi_rtt,
        rtt_var_us: info.tcpi_rttvar,
        snd_cwnd: info.tcpi_snd_cwnd,
        snd_mss: info.tcpi_snd_mss,
        unacked: info.tcpi_unacked,
        total_retrans: info.tcpi_total_retrans,
    })
}

#[cfg(not(target_os = "linux"))]
fn query_tcp_info(_socket: &Socket) -> Result<TransportInfo, TransportError> {
    Err(TransportError::Unsupported("TCP_INFO"))
}
