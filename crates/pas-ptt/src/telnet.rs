//! Minimal telnet option handling (RFC 854/855).
//!
//! The client refuses every option except server-side ECHO and
//! SUPPRESS-GO-AHEAD, which PTT needs for character-at-a-time input.

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Streaming decoder; keeps state across reads so split sequences are handled.
#[derive(Debug, Default)]
pub struct TelnetCodec {
    state: State,
}

impl TelnetCodec {
    /// Split raw bytes into terminal data and the replies owed to the server.
    pub fn decode(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &b in input {
            self.state = match (self.state, b) {
                (State::Data, IAC) => State::Iac,
                (State::Data, _) => {
                    data.push(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    data.push(IAC);
                    State::Data
                }
                (State::Iac, WILL | WONT | DO | DONT) => State::Negotiate(b),
                (State::Iac, SB) => State::Sub,
                // NOP, GA and friends carry no payload.
                (State::Iac, _) => State::Data,
                (State::Negotiate(cmd), opt) => {
                    answer(cmd, opt, replies);
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }
    }
}

fn answer(cmd: u8, opt: u8, replies: &mut Vec<u8>) {
    let reply = match cmd {
        WILL if opt == OPT_ECHO || opt == OPT_SGA => DO,
        WILL => DONT,
        DO if opt == OPT_SGA => WILL,
        DO => WONT,
        _ => return,
    };
    replies.extend_from_slice(&[IAC, reply, opt]);
}

/// Double any IAC byte in outgoing data.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}
