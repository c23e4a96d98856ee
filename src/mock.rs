//! Fake providers and a fake STM32 bootloader for tests.
//!
//! All mocks share one [`Bench`] so tests can check the interleaving of
//! line changes, UART traffic and delays.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;

use crate::hal::{Gpio, Level, PinId, Storage, Uart, UartChannel, UartSettings};
use crate::protocol::{checksum, UART_ACK, UART_DISC, UART_NACK};

pub const RESET: PinId = 5;
pub const BOOT0: PinId = 4;
pub const TX: PinId = 43;
pub const RX: PinId = 6;
pub const CHANNEL: UartChannel = 1;

#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    Output(PinId),
    Level(PinId, Level),
    Configure(UartChannel, UartSettings),
    Pins(UartChannel, PinId, PinId),
    Write(Vec<u8>),
    Delay(u32),
    Mount,
    Open(String),
    Close,
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum TargetState {
    Idle,
    EraseParams(usize),
    WriteAddress,
    WriteData(u32),
    ReadAddress,
    ReadLength(u32),
}

/// Fake AN3155 bootloader, reset whenever the RESET line is pulled low
pub struct FakeTarget {
    /// Answer anything at all
    pub responsive: bool,
    /// 1-based page write to NACK
    pub nack_write: Option<usize>,
    /// Command opcode to refuse
    pub nack_opcode: Option<u8>,
    /// 1-based page read to NACK
    pub fail_read: Option<usize>,
    /// Accept at most this many bytes per UART write
    pub accept_limit: Option<usize>,

    pub syncs: usize,
    pub mass_erases: usize,
    pub extended_erases: usize,
    pub writes: usize,
    pub reads: usize,
    pub written: Vec<(u32, Vec<u8>)>,
    pub read_addresses: Vec<u32>,
    /// Contents returned by page reads, keyed by address
    pub memory: HashMap<u32, Vec<u8>>,

    state: TargetState,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self {
            responsive: true,
            nack_write: None,
            nack_opcode: None,
            fail_read: None,
            accept_limit: None,
            syncs: 0,
            mass_erases: 0,
            extended_erases: 0,
            writes: 0,
            reads: 0,
            written: Vec::new(),
            read_addresses: Vec::new(),
            memory: HashMap::new(),
            state: TargetState::Idle,
            rx: Vec::new(),
            tx: VecDeque::new(),
        }
    }
}

impl FakeTarget {
    pub fn reset(&mut self) {
        self.state = TargetState::Idle;
        self.rx.clear();
        self.tx.clear();
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.tx.extend(bytes.iter().copied());
    }

    fn next(&mut self, state: TargetState) {
        self.state = state;
        self.rx.clear();
    }

    fn address(&self) -> Option<u32> {
        if checksum(&self.rx[..4]) == self.rx[4] {
            Some(u32::from_be_bytes([self.rx[0], self.rx[1], self.rx[2], self.rx[3]]))
        } else {
            None
        }
    }

    pub fn receive(&mut self, byte: u8) {
        if !self.responsive {
            return;
        }
        self.rx.push(byte);

        match self.state {
            TargetState::Idle if self.rx == [UART_DISC] => {
                self.syncs += 1;
                self.respond(&[UART_ACK]);
                self.next(TargetState::Idle);
            }
            TargetState::Idle if self.rx.len() == 2 => {
                let (op, complement) = (self.rx[0], self.rx[1]);
                if complement != !op || self.nack_opcode == Some(op) {
                    self.respond(&[UART_NACK]);
                    return self.next(TargetState::Idle);
                }
                let next = match op {
                    0x00 => {
                        self.respond(&[
                            UART_ACK, 0x0B, 0x31, 0x00, 0x01, 0x02, 0x11, 0x21, 0x31, 0x44, 0x63,
                            0x73, 0x82, 0x92, UART_ACK,
                        ]);
                        TargetState::Idle
                    }
                    0x01 => {
                        self.respond(&[UART_ACK, 0x31, 0x00, 0x00, UART_ACK]);
                        TargetState::Idle
                    }
                    0x02 => {
                        self.respond(&[UART_ACK, 0x01, 0x04, 0x13, UART_ACK]);
                        TargetState::Idle
                    }
                    0x43 => {
                        self.respond(&[UART_ACK]);
                        TargetState::EraseParams(2)
                    }
                    0x44 => {
                        self.respond(&[UART_ACK]);
                        TargetState::EraseParams(3)
                    }
                    0x31 => {
                        self.respond(&[UART_ACK]);
                        TargetState::WriteAddress
                    }
                    0x11 => {
                        self.respond(&[UART_ACK]);
                        TargetState::ReadAddress
                    }
                    _ => {
                        self.respond(&[UART_NACK]);
                        TargetState::Idle
                    }
                };
                self.next(next);
            }
            TargetState::EraseParams(n) if self.rx.len() == n => {
                if n == 2 {
                    self.mass_erases += 1;
                } else {
                    self.extended_erases += 1;
                }
                self.respond(&[UART_ACK]);
                self.next(TargetState::Idle);
            }
            TargetState::WriteAddress if self.rx.len() == 5 => match self.address() {
                Some(a) => {
                    self.respond(&[UART_ACK]);
                    self.next(TargetState::WriteData(a));
                }
                None => {
                    self.respond(&[UART_NACK]);
                    self.next(TargetState::Idle);
                }
            },
            TargetState::WriteData(address) => {
                let n = self.rx[0] as usize + 1;
                if self.rx.len() < n + 2 {
                    return;
                }
                self.writes += 1;
                let ok = checksum(&self.rx[..=n]) == self.rx[n + 1]
                    && self.nack_write != Some(self.writes);
                if ok {
                    let data = self.rx[1..=n].to_vec();
                    self.written.push((address, data));
                    self.respond(&[UART_ACK]);
                } else {
                    self.respond(&[UART_NACK]);
                }
                self.next(TargetState::Idle);
            }
            TargetState::ReadAddress if self.rx.len() == 5 => match self.address() {
                Some(a) => {
                    self.respond(&[UART_ACK]);
                    self.next(TargetState::ReadLength(a));
                }
                None => {
                    self.respond(&[UART_NACK]);
                    self.next(TargetState::Idle);
                }
            },
            TargetState::ReadLength(address) if self.rx.len() == 2 => {
                let n = self.rx[0] as usize + 1;
                if self.rx[1] != !self.rx[0] {
                    self.respond(&[UART_NACK]);
                    return self.next(TargetState::Idle);
                }
                self.reads += 1;
                self.read_addresses.push(address);
                if self.fail_read == Some(self.reads) {
                    self.respond(&[UART_NACK]);
                    return self.next(TargetState::Idle);
                }
                let data = self
                    .memory
                    .get(&address)
                    .cloned()
                    .unwrap_or_else(|| vec![0xFF; n]);
                self.respond(&[UART_ACK]);
                self.respond(&data[..n]);
                self.next(TargetState::Idle);
            }
            _ => (),
        }
    }
}

#[derive(Default)]
pub struct Bench {
    pub events: Vec<Event>,
    pub target: FakeTarget,
    pub gpio_fails: bool,
    pub uart_fails: bool,
    pub storage_fails: bool,
}

impl Bench {
    /// Events excluding response poll delays
    pub fn significant(&self, poll_ms: u32) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| **e != Event::Delay(poll_ms))
            .cloned()
            .collect()
    }

    pub fn hardware_events(&self) -> usize {
        self.events
            .iter()
            .filter(|e| match e {
                Event::Mount | Event::Open(_) | Event::Close => false,
                _ => true,
            })
            .count()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }
}

pub type Shared = Rc<RefCell<Bench>>;

pub fn bench() -> Shared {
    Rc::new(RefCell::new(Bench::default()))
}

pub struct MockGpio(pub Shared);

impl Gpio for MockGpio {
    type Error = &'static str;

    fn set_output(&mut self, pin: PinId) -> Result<(), Self::Error> {
        let mut b = self.0.borrow_mut();
        if b.gpio_fails {
            return Err("gpio unavailable");
        }
        b.events.push(Event::Output(pin));
        Ok(())
    }

    fn set_level(&mut self, pin: PinId, level: Level) {
        let mut b = self.0.borrow_mut();
        b.events.push(Event::Level(pin, level));
        if pin == RESET && level == Level::Low {
            b.target.reset();
        }
    }
}

pub struct MockUart(pub Shared);

impl Uart for MockUart {
    type Error = &'static str;

    fn configure(
        &mut self,
        channel: UartChannel,
        settings: &UartSettings,
    ) -> Result<(), Self::Error> {
        let mut b = self.0.borrow_mut();
        if b.uart_fails {
            return Err("uart unavailable");
        }
        b.events.push(Event::Configure(channel, *settings));
        Ok(())
    }

    fn set_pins(&mut self, channel: UartChannel, tx: PinId, rx: PinId) -> Result<(), Self::Error> {
        self.0.borrow_mut().events.push(Event::Pins(channel, tx, rx));
        Ok(())
    }

    fn write(&mut self, _channel: UartChannel, bytes: &[u8]) -> Result<usize, Self::Error> {
        let mut b = self.0.borrow_mut();
        b.events.push(Event::Write(bytes.to_vec()));

        let accepted = match b.target.accept_limit {
            Some(limit) if bytes.len() > limit => limit,
            _ => bytes.len(),
        };
        for &byte in &bytes[..accepted] {
            b.target.receive(byte);
        }
        Ok(accepted)
    }

    fn buffered_len(&mut self, _channel: UartChannel) -> Result<usize, Self::Error> {
        Ok(self.0.borrow().target.tx.len())
    }

    fn read_exact(&mut self, _channel: UartChannel, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut b = self.0.borrow_mut();
        let mut n = 0;
        for slot in buff.iter_mut() {
            match b.target.tx.pop_front() {
                Some(v) => *slot = v,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }
}

pub struct MockDelay(pub Shared);

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().events.push(Event::Delay(ms));
    }
}

pub struct MockFile {
    data: Vec<u8>,
    pos: usize,
}

pub struct MockStorage {
    pub bench: Shared,
    pub files: HashMap<String, Vec<u8>>,
}

impl MockStorage {
    pub fn new(bench: &Shared) -> Self {
        Self {
            bench: bench.clone(),
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), data);
        self
    }
}

impl Storage for MockStorage {
    type Error = &'static str;
    type Handle = MockFile;

    fn mount(&mut self) -> Result<(), Self::Error> {
        let mut b = self.bench.borrow_mut();
        if b.storage_fails {
            return Err("no filesystem");
        }
        b.events.push(Event::Mount);
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<Option<Self::Handle>, Self::Error> {
        self.bench.borrow_mut().events.push(Event::Open(name.to_string()));
        Ok(self.files.get(name).map(|data| MockFile {
            data: data.clone(),
            pos: 0,
        }))
    }

    fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error> {
        Ok(handle.data.len() as u64)
    }

    fn read(&mut self, handle: &mut Self::Handle, buff: &mut [u8]) -> Result<usize, Self::Error> {
        // Short reads exercise the block fill loop
        let n = buff.len().min(100).min(handle.data.len() - handle.pos);
        buff[..n].copy_from_slice(&handle.data[handle.pos..handle.pos + n]);
        handle.pos += n;
        Ok(n)
    }

    fn rewind(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error> {
        handle.pos = 0;
        Ok(())
    }

    fn close(&mut self, _handle: Self::Handle) {
        self.bench.borrow_mut().events.push(Event::Close);
    }
}
