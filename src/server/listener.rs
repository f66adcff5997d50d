use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener},
};

const BACKLOG: i32 = 128;

/// Opens a listening socket on `port` on all IPv4 interfaces.
///
/// The address is reusable right away, so a restarted server does not have
/// to wait for lingering connections of the previous one.
pub fn bind(port: u16) -> io::Result<TcpListener> {
    bind_addr(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
}

pub(crate) fn bind_addr(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
