// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Host-side rtnetlink client.
//
// Talks NETLINK_ROUTE to the kernel over a raw socket: dumps links, addresses
// and routes into typed caches, brings interfaces up/down, assigns IPv4
// addresses and installs the default route. Every request carries a strictly
// increasing sequence number and the process id, is flagged
// NLM_F_REQUEST | NLM_F_ACK, and is answered synchronously with an ACK or a
// NLMSG_DONE before the next request goes out.
//
// The helper is not thread-safe; each container lifecycle owns its own
// instance and performs its network setup serially.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NetlinkError {
    #[error("netlink socket setup failed: {0}")]
    Socket(#[source] io::Error),
    #[error("failed to send netlink request: {0}")]
    Send(#[source] io::Error),
    #[error("failed to receive netlink reply: {0}")]
    Receive(#[source] io::Error),
    #[error("kernel returned netlink error code {0}")]
    Kernel(i32),
    #[error("malformed netlink message: {0}")]
    Malformed(&'static str),
    #[error("no cached link with index {0}")]
    UnknownLink(i32),
}

// rtnetlink structures mirroring linux/rtnetlink.h; libc does not export
// these payload types.

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct RtGenMsg {
    rtgen_family: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct IfInfoMsg {
    ifi_family: u8,
    _ifi_pad: u8,
    ifi_type: u16,
    ifi_index: i32,
    ifi_flags: u32,
    ifi_change: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct IfAddrMsg {
    ifa_family: u8,
    ifa_prefixlen: u8,
    ifa_flags: u8,
    ifa_scope: u8,
    ifa_index: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct RtMsg {
    rtm_family: u8,
    rtm_dst_len: u8,
    rtm_src_len: u8,
    rtm_tos: u8,
    rtm_table: u8,
    rtm_protocol: u8,
    rtm_scope: u8,
    rtm_type: u8,
    rtm_flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RtAttr {
    rta_len: u16,
    rta_type: u16,
}

// Attribute and rtnetlink constants not exported by libc (linux/if_link.h,
// linux/if_addr.h, linux/rtnetlink.h).
const IFLA_IFNAME: u16 = 3;
const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;
const IFA_BROADCAST: u16 = 4;
const RTA_GATEWAY: u16 = 5;
const RT_TABLE_MAIN: u8 = 254;
const RTPROT_STATIC: u8 = 4;
const RT_SCOPE_UNIVERSE: u8 = 0;
const RTN_UNICAST: u8 = 1;

const NLMSG_HDRLEN: usize = mem::size_of::<libc::nlmsghdr>();
const RTA_HDRLEN: usize = mem::size_of::<RtAttr>();

fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

fn as_bytes<T: Copy>(value: &T) -> &[u8] {
    // Safety: T is a plain repr(C) struct; reading size_of::<T>() bytes from
    // a valid reference cannot go out of bounds.
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>()) }
}

fn read_struct<T: Copy>(bytes: &[u8]) -> Result<T, NetlinkError> {
    if bytes.len() < mem::size_of::<T>() {
        return Err(NetlinkError::Malformed("payload shorter than message struct"));
    }
    // Safety: length checked above; read_unaligned tolerates any alignment.
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

/// Hands out strictly increasing request sequence numbers, starting at 1.
#[derive(Debug)]
struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn next(&mut self) -> u32 {
        let seq = self.next;
        self.next += 1;
        seq
    }
}

/// A serialized netlink request: header, payload, attributes.
struct NetlinkRequest {
    buf: Vec<u8>,
}

impl NetlinkRequest {
    fn new<P: Copy>(msg_type: u16, flags: u16, seq: u32, pid: u32, payload: P) -> Self {
        let total = NLMSG_HDRLEN + nlmsg_align(mem::size_of::<P>());
        let header = libc::nlmsghdr {
            nlmsg_len: total as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags | (libc::NLM_F_REQUEST | libc::NLM_F_ACK) as u16,
            nlmsg_seq: seq,
            nlmsg_pid: pid,
        };

        let mut buf = vec![0u8; total];
        buf[..NLMSG_HDRLEN].copy_from_slice(as_bytes(&header));
        buf[NLMSG_HDRLEN..NLMSG_HDRLEN + mem::size_of::<P>()].copy_from_slice(as_bytes(&payload));
        Self { buf }
    }

    /// Append a tag-length-value attribute and update the message length.
    fn add_attribute(&mut self, rta_type: u16, data: &[u8]) {
        let attr = RtAttr {
            rta_len: (RTA_HDRLEN + data.len()) as u16,
            rta_type,
        };
        self.buf.extend_from_slice(as_bytes(&attr));
        self.buf.extend_from_slice(data);
        let padded = nlmsg_align(self.buf.len());
        self.buf.resize(padded, 0);
        self.set_len(self.buf.len() as u32);
    }

    fn set_len(&mut self, len: u32) {
        self.buf[..4].copy_from_slice(&len.to_ne_bytes());
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    #[cfg(test)]
    fn header(&self) -> libc::nlmsghdr {
        // Safety: the buffer always starts with a complete header.
        unsafe { std::ptr::read_unaligned(self.buf.as_ptr() as *const libc::nlmsghdr) }
    }
}

/// A cached network link (interface).
#[derive(Debug, Clone)]
pub struct Link {
    pub index: i32,
    pub device_type: u16,
    pub flags: u32,
    pub name: Option<String>,
}

impl Link {
    pub fn is_loopback(&self) -> bool {
        self.device_type == libc::ARPHRD_LOOPBACK
    }
}

/// A cached interface address.
#[derive(Debug, Clone)]
pub struct Address {
    pub index: u32,
    pub family: u8,
    pub prefix_length: u8,
    pub local: Option<Ipv4Addr>,
    pub address: Option<Ipv4Addr>,
}

/// A cached routing table entry.
#[derive(Debug, Clone)]
pub struct Route {
    pub family: u8,
    pub table: u8,
    pub gateway: Option<Ipv4Addr>,
}

pub struct NetlinkHelper {
    fd: RawFd,
    pid: u32,
    sequence: SequenceCounter,
    links: Vec<Link>,
    addresses: Vec<Address>,
    routes: Vec<Route>,
    dumped: bool,
}

impl NetlinkHelper {
    /// Open and bind the NETLINK_ROUTE socket.
    pub fn new() -> Result<Self, NetlinkError> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, libc::NETLINK_ROUTE) };
        if fd < 0 {
            return Err(NetlinkError::Socket(io::Error::last_os_error()));
        }

        let pid = std::process::id();
        let mut local: libc::sockaddr_nl = unsafe { mem::zeroed() };
        local.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // nl_pid 0 lets the kernel pick a unique port; several lifecycles in
        // one process each own a socket. Request headers still carry the
        // process id as the caller identifier.
        local.nl_pid = 0;
        local.nl_groups = 0;

        let rc = unsafe {
            libc::bind(
                fd,
                &local as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(NetlinkError::Socket(err));
        }

        Ok(Self {
            fd,
            pid,
            sequence: SequenceCounter::new(),
            links: Vec::new(),
            addresses: Vec::new(),
            routes: Vec::new(),
            dumped: false,
        })
    }

    /// Refresh the local caches of links, addresses and routes.
    pub fn dump(&mut self) -> Result<(), NetlinkError> {
        self.links.clear();
        self.addresses.clear();
        self.routes.clear();

        let family = RtGenMsg {
            rtgen_family: libc::AF_PACKET as u8,
        };

        for msg_type in [libc::RTM_GETLINK, libc::RTM_GETADDR, libc::RTM_GETROUTE] {
            let request = self.request(msg_type, libc::NLM_F_DUMP as u16, family);
            self.send(&request)?;
        }

        self.dumped = true;
        debug!(
            links = self.links.len(),
            addresses = self.addresses.len(),
            routes = self.routes.len(),
            "netlink dump complete"
        );
        Ok(())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Indexes and names of all cached non-loopback interfaces.
    pub fn interfaces(&self) -> Vec<(i32, String)> {
        self.links
            .iter()
            .filter(|link| !link.is_loopback())
            .filter_map(|link| link.name.clone().map(|name| (link.index, name)))
            .collect()
    }

    /// Bring an interface up and assign it an IPv4 address.
    ///
    /// Loopback interfaces are only brought up; the address step is skipped.
    pub fn up(&mut self, ifindex: i32, ip: Ipv4Addr, prefix_length: u8) -> Result<(), NetlinkError> {
        self.ensure_dumped()?;
        let link = self
            .links
            .iter()
            .find(|link| link.index == ifindex)
            .cloned()
            .ok_or(NetlinkError::UnknownLink(ifindex))?;

        let mut up_payload = IfInfoMsg::default();
        up_payload.ifi_family = libc::AF_UNSPEC as u8;
        up_payload.ifi_index = ifindex;
        up_payload.ifi_flags = link.flags | libc::IFF_UP as u32;
        up_payload.ifi_change = libc::IFF_UP as u32;

        let request = self.request(libc::RTM_NEWLINK, libc::NLM_F_CREATE as u16, up_payload);
        self.send(&request)?;

        if link.is_loopback() {
            return Ok(());
        }

        let mut addr_payload = IfAddrMsg::default();
        addr_payload.ifa_family = libc::AF_INET as u8;
        addr_payload.ifa_prefixlen = prefix_length;
        addr_payload.ifa_scope = RT_SCOPE_UNIVERSE;
        addr_payload.ifa_index = ifindex as u32;

        let mut request = self.request(
            libc::RTM_NEWADDR,
            (libc::NLM_F_CREATE | libc::NLM_F_REPLACE) as u16,
            addr_payload,
        );
        request.add_attribute(IFA_LOCAL, &ip.octets());
        request.add_attribute(IFA_BROADCAST, &broadcast_for(ip, prefix_length).octets());
        self.send(&request)
    }

    /// Bring an interface down: delete its cached addresses, then the link.
    pub fn down(&mut self, ifindex: i32) -> Result<(), NetlinkError> {
        self.ensure_dumped()?;

        let addresses: Vec<Address> = self
            .addresses
            .iter()
            .filter(|address| address.index == ifindex as u32)
            .cloned()
            .collect();

        for address in addresses {
            let mut payload = IfAddrMsg::default();
            payload.ifa_family = address.family;
            payload.ifa_prefixlen = address.prefix_length;
            payload.ifa_index = address.index;

            let mut request = self.request(libc::RTM_DELADDR, 0, payload);
            if let Some(local) = address.local {
                request.add_attribute(IFA_LOCAL, &local.octets());
            }
            self.send(&request)?;
        }

        let mut payload = IfInfoMsg::default();
        payload.ifi_family = libc::AF_UNSPEC as u8;
        payload.ifi_index = ifindex;

        let request = self.request(libc::RTM_DELLINK, 0, payload);
        self.send(&request)
    }

    /// Install an IPv4 default route through the given gateway.
    pub fn set_default_gateway(&mut self, gateway: Ipv4Addr) -> Result<(), NetlinkError> {
        let mut payload = RtMsg::default();
        payload.rtm_family = libc::AF_INET as u8;
        payload.rtm_table = RT_TABLE_MAIN;
        payload.rtm_protocol = RTPROT_STATIC;
        payload.rtm_scope = RT_SCOPE_UNIVERSE;
        payload.rtm_type = RTN_UNICAST;

        let mut request = self.request(
            libc::RTM_NEWROUTE,
            (libc::NLM_F_CREATE | libc::NLM_F_REPLACE) as u16,
            payload,
        );
        request.add_attribute(RTA_GATEWAY, &gateway.octets());
        self.send(&request)
    }

    /// Check that a bridge with the given name exists and carries the
    /// expected address.
    pub fn is_bridge_available(
        &mut self,
        name: &str,
        expected: Ipv4Addr,
    ) -> Result<bool, NetlinkError> {
        self.ensure_dumped()?;

        let Some(bridge_index) = self
            .links
            .iter()
            .find(|link| link.name.as_deref() == Some(name))
            .map(|link| link.index as u32)
        else {
            return Ok(false);
        };

        let has_address = self.addresses.iter().any(|address| {
            address.index == bridge_index
                && (address.address == Some(expected) || address.local == Some(expected))
        });
        Ok(has_address)
    }

    fn ensure_dumped(&mut self) -> Result<(), NetlinkError> {
        if !self.dumped {
            self.dump()?;
        }
        Ok(())
    }

    fn request<P: Copy>(&mut self, msg_type: u16, flags: u16, payload: P) -> NetlinkRequest {
        NetlinkRequest::new(msg_type, flags, self.sequence.next(), self.pid, payload)
    }

    /// Send one request to the kernel and consume its reply synchronously.
    fn send(&mut self, request: &NetlinkRequest) -> Result<(), NetlinkError> {
        let mut kernel: libc::sockaddr_nl = unsafe { mem::zeroed() };
        kernel.nl_family = libc::AF_NETLINK as libc::sa_family_t;

        let sent = unsafe {
            libc::sendto(
                self.fd,
                request.bytes().as_ptr() as *const libc::c_void,
                request.bytes().len(),
                0,
                &kernel as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(NetlinkError::Send(io::Error::last_os_error()));
        }

        self.read_reply()
    }

    /// Read kernel replies until an ACK or NLMSG_DONE arrives, materializing
    /// dump records into the typed caches as they pass by.
    fn read_reply(&mut self) -> Result<(), NetlinkError> {
        let mut buf = vec![0u8; 8192];

        loop {
            let received = unsafe {
                libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
            };
            if received < 0 {
                return Err(NetlinkError::Receive(io::Error::last_os_error()));
            }

            let mut offset = 0usize;
            let total = received as usize;
            while offset + NLMSG_HDRLEN <= total {
                let header: libc::nlmsghdr = read_struct(&buf[offset..])?;
                let msg_len = header.nlmsg_len as usize;
                if msg_len < NLMSG_HDRLEN || offset + msg_len > total {
                    return Err(NetlinkError::Malformed("message length out of bounds"));
                }

                let payload = &buf[offset + NLMSG_HDRLEN..offset + msg_len];
                match header.nlmsg_type as libc::c_int {
                    libc::NLMSG_ERROR => {
                        let error: i32 = read_struct(payload)?;
                        if error != 0 {
                            return Err(NetlinkError::Kernel(-error));
                        }
                        // Zero error payload is the ACK.
                        return Ok(());
                    }
                    libc::NLMSG_DONE => return Ok(()),
                    t if t == libc::RTM_NEWLINK as libc::c_int => {
                        let link = parse_link(payload)?;
                        self.links.push(link);
                    }
                    t if t == libc::RTM_NEWADDR as libc::c_int => {
                        let address = parse_address(payload)?;
                        self.addresses.push(address);
                    }
                    t if t == libc::RTM_NEWROUTE as libc::c_int => {
                        let route = parse_route(payload)?;
                        self.routes.push(route);
                    }
                    other => {
                        debug!(msg_type = other, "ignoring netlink message");
                    }
                }
                offset += nlmsg_align(msg_len);
            }
        }
    }
}

impl Drop for NetlinkHelper {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// IPv4 broadcast address for a network given one of its addresses and the
/// prefix length.
pub fn broadcast_for(ip: Ipv4Addr, prefix_length: u8) -> Ipv4Addr {
    if prefix_length >= 32 {
        return ip;
    }
    let host_mask = !0u32 >> prefix_length;
    Ipv4Addr::from(u32::from(ip) | host_mask)
}

/// Iterate the attributes that follow a payload struct of the given size,
/// copying each attribute's data into an owned record.
fn parse_attributes(payload: &[u8], struct_size: usize) -> Vec<(u16, Vec<u8>)> {
    let mut attributes = Vec::new();
    let mut offset = nlmsg_align(struct_size);

    while offset + RTA_HDRLEN <= payload.len() {
        let attr: RtAttr = match read_struct(&payload[offset..]) {
            Ok(attr) => attr,
            Err(_) => break,
        };
        let attr_len = attr.rta_len as usize;
        if attr_len < RTA_HDRLEN || offset + attr_len > payload.len() {
            break;
        }
        let data = payload[offset + RTA_HDRLEN..offset + attr_len].to_vec();
        attributes.push((attr.rta_type, data));
        offset += nlmsg_align(attr_len);
    }

    attributes
}

fn ipv4_from(data: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = data.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn parse_link(payload: &[u8]) -> Result<Link, NetlinkError> {
    let info: IfInfoMsg = read_struct(payload)?;
    let attributes = parse_attributes(payload, mem::size_of::<IfInfoMsg>());

    let name = attributes
        .iter()
        .find(|(attr_type, _)| *attr_type == IFLA_IFNAME)
        .map(|(_, data)| {
            let end = data.iter().position(|byte| *byte == 0).unwrap_or(data.len());
            String::from_utf8_lossy(&data[..end]).into_owned()
        });

    Ok(Link {
        index: info.ifi_index,
        device_type: info.ifi_type,
        flags: info.ifi_flags,
        name,
    })
}

fn parse_address(payload: &[u8]) -> Result<Address, NetlinkError> {
    let info: IfAddrMsg = read_struct(payload)?;
    let attributes = parse_attributes(payload, mem::size_of::<IfAddrMsg>());

    let mut local = None;
    let mut address = None;
    for (attr_type, data) in &attributes {
        match *attr_type {
            IFA_LOCAL => local = ipv4_from(data),
            IFA_ADDRESS => address = ipv4_from(data),
            _ => {}
        }
    }

    Ok(Address {
        index: info.ifa_index,
        family: info.ifa_family,
        prefix_length: info.ifa_prefixlen,
        local,
        address,
    })
}

fn parse_route(payload: &[u8]) -> Result<Route, NetlinkError> {
    let info: RtMsg = read_struct(payload)?;
    let attributes = parse_attributes(payload, mem::size_of::<RtMsg>());

    let gateway = attributes
        .iter()
        .find(|(attr_type, _)| *attr_type == RTA_GATEWAY)
        .and_then(|(_, data)| ipv4_from(data));

    Ok(Route {
        family: info.rtm_family,
        table: info.rtm_table,
        gateway,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_four() {
        assert_eq!(nlmsg_align(0), 0);
        assert_eq!(nlmsg_align(1), 4);
        assert_eq!(nlmsg_align(4), 4);
        assert_eq!(nlmsg_align(5), 8);
        assert_eq!(nlmsg_align(17), 20);
    }

    #[test]
    fn sequence_numbers_start_at_one_and_strictly_increase() {
        let mut counter = SequenceCounter::new();
        let mut previous = 0;
        for _ in 0..100 {
            let seq = counter.next();
            assert!(seq > previous);
            previous = seq;
        }
        assert_eq!(SequenceCounter::new().next(), 1);
    }

    #[test]
    fn request_header_carries_seq_pid_and_mandatory_flags() {
        let payload = RtGenMsg {
            rtgen_family: libc::AF_PACKET as u8,
        };
        let request = NetlinkRequest::new(libc::RTM_GETLINK, libc::NLM_F_DUMP as u16, 7, 1234, payload);

        let header = request.header();
        assert_eq!(header.nlmsg_seq, 7);
        assert_eq!(header.nlmsg_pid, 1234);
        assert_eq!(header.nlmsg_type, libc::RTM_GETLINK);
        assert_ne!(header.nlmsg_flags & libc::NLM_F_REQUEST as u16, 0);
        assert_ne!(header.nlmsg_flags & libc::NLM_F_ACK as u16, 0);
        assert_ne!(header.nlmsg_flags & libc::NLM_F_DUMP as u16, 0);
        assert_eq!(header.nlmsg_len as usize, request.bytes().len());
    }

    #[test]
    fn attributes_extend_the_message() {
        let payload = IfAddrMsg {
            ifa_family: libc::AF_INET as u8,
            ifa_prefixlen: 24,
            ifa_flags: 0,
            ifa_scope: RT_SCOPE_UNIVERSE,
            ifa_index: 2,
        };
        let mut request = NetlinkRequest::new(libc::RTM_NEWADDR, 0, 1, 1, payload);
        let before = request.bytes().len();

        request.add_attribute(IFA_LOCAL, &Ipv4Addr::new(10, 0, 3, 100).octets());

        let header = request.header();
        assert_eq!(header.nlmsg_len as usize, request.bytes().len());
        assert_eq!(request.bytes().len(), before + RTA_HDRLEN + 4);

        // The attribute round-trips through the parser.
        let attributes = parse_attributes(&request.bytes()[NLMSG_HDRLEN..], mem::size_of::<IfAddrMsg>());
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].0, IFA_LOCAL);
        assert_eq!(ipv4_from(&attributes[0].1), Some(Ipv4Addr::new(10, 0, 3, 100)));
    }

    fn synthetic_link_payload(index: i32, device_type: u16, name: &str) -> Vec<u8> {
        let info = IfInfoMsg {
            ifi_family: 0,
            _ifi_pad: 0,
            ifi_type: device_type,
            ifi_index: index,
            ifi_flags: libc::IFF_UP as u32,
            ifi_change: 0,
        };
        let mut payload = as_bytes(&info).to_vec();
        payload.resize(nlmsg_align(payload.len()), 0);

        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.push(0);
        let attr = RtAttr {
            rta_len: (RTA_HDRLEN + name_bytes.len()) as u16,
            rta_type: IFLA_IFNAME,
        };
        payload.extend_from_slice(as_bytes(&attr));
        payload.extend_from_slice(&name_bytes);
        payload.resize(nlmsg_align(payload.len()), 0);
        payload
    }

    #[test]
    fn parse_link_extracts_name_and_type() {
        let payload = synthetic_link_payload(4, libc::ARPHRD_LOOPBACK, "lo");
        let link = parse_link(&payload).unwrap();
        assert_eq!(link.index, 4);
        assert_eq!(link.name.as_deref(), Some("lo"));
        assert!(link.is_loopback());

        let payload = synthetic_link_payload(2, 1, "lxcbr0");
        let link = parse_link(&payload).unwrap();
        assert_eq!(link.name.as_deref(), Some("lxcbr0"));
        assert!(!link.is_loopback());
    }

    #[test]
    fn parse_address_extracts_ipv4_attributes() {
        let info = IfAddrMsg {
            ifa_family: libc::AF_INET as u8,
            ifa_prefixlen: 24,
            ifa_flags: 0,
            ifa_scope: RT_SCOPE_UNIVERSE,
            ifa_index: 2,
        };
        let mut payload = as_bytes(&info).to_vec();
        payload.resize(nlmsg_align(payload.len()), 0);

        let local = Ipv4Addr::new(10, 0, 3, 1);
        let attr = RtAttr {
            rta_len: (RTA_HDRLEN + 4) as u16,
            rta_type: IFA_LOCAL,
        };
        payload.extend_from_slice(as_bytes(&attr));
        payload.extend_from_slice(&local.octets());

        let address = parse_address(&payload).unwrap();
        assert_eq!(address.index, 2);
        assert_eq!(address.prefix_length, 24);
        assert_eq!(address.local, Some(local));
        assert_eq!(address.address, None);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        assert!(parse_link(&[0u8; 4]).is_err());
        assert!(read_struct::<libc::nlmsghdr>(&[0u8; 8]).is_err());
    }

    #[test]
    fn broadcast_addresses() {
        assert_eq!(
            broadcast_for(Ipv4Addr::new(10, 0, 3, 100), 24),
            Ipv4Addr::new(10, 0, 3, 255)
        );
        assert_eq!(
            broadcast_for(Ipv4Addr::new(192, 168, 0, 1), 16),
            Ipv4Addr::new(192, 168, 255, 255)
        );
        assert_eq!(
            broadcast_for(Ipv4Addr::new(10, 0, 3, 100), 32),
            Ipv4Addr::new(10, 0, 3, 100)
        );
    }
}
