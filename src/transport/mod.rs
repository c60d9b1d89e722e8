mod connection;
mod listener;
mod shutdown;

pub(crate) use connection::spawn_connection;
pub(crate) use connection::ConnectionHandle;
pub(crate) use connection::ConnectionId;
pub(crate) use connection::DisconnectReason;
pub(crate) use listener::run_accept_loop;
pub(crate) use shutdown::close_pair;
pub(crate) use shutdown::CloseHandle;
pub(crate) use shutdown::Closed;

#[cfg(test)]
pub(crate) use connection::stub_connection;
