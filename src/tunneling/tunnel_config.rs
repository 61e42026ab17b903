use std::net::Ipv4Addr;

pub const CONNECT_KEY: &str = "connect=";
/// port every catalog server listens on
pub const TUNNEL_PORT: u16 = 443;

/// The stunnel configuration as raw lines, each keeping its own terminator.
///
/// Lines are bytes: comments in legacy code pages (cp1251 and friends) pass
/// through untouched, only the ASCII `connect=` key is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TunnelConfig {
    lines: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Rewrite {
    /// number of `connect=` lines that got the new value
    Replaced(usize),
    Appended,
}

impl TunnelConfig {
    pub fn parse(raw: &[u8]) -> TunnelConfig {
        TunnelConfig {
            lines: raw
                .split_inclusive(|byte| *byte == b'\n')
                .map(<[u8]>::to_vec)
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn render(&self) -> Vec<u8> {
        self.lines.concat()
    }

    /// Host part of the first `connect=` line, if there is one with a non-empty host.
    pub fn current_host(&self) -> Option<String> {
        self.lines
            .iter()
            .find_map(|line| connect_value(line))
            .map(|value| {
                value
                    .split(|byte| *byte == b':')
                    .next()
                    .unwrap_or_default()
                    .trim_ascii()
            })
            .filter(|host| !host.is_empty())
            .map(|host| String::from_utf8_lossy(host).into_owned())
    }

    /// Points every `connect=` line at `host`, or appends one after a blank line.
    pub fn point_to(&mut self, host: Ipv4Addr) -> Rewrite {
        let mut replaced = 0;
        for line in self.lines.iter_mut() {
            if connect_value(line).is_none() {
                continue;
            }
            let terminator = match terminator_of(line) {
                b"" => b"\n".as_slice(),
                other => other,
            };
            let mut rewritten = connect_line(host).into_bytes();
            rewritten.extend_from_slice(terminator);
            *line = rewritten;
            replaced += 1;
        }
        if replaced > 0 {
            return Rewrite::Replaced(replaced);
        }

        let terminator = self.preferred_terminator();
        self.lines.push(terminator.to_vec());
        let mut appended = connect_line(host).into_bytes();
        appended.extend_from_slice(terminator);
        self.lines.push(appended);
        Rewrite::Appended
    }

    fn preferred_terminator(&self) -> &'static [u8] {
        if self.lines.iter().any(|line| line.ends_with(b"\r\n")) {
            b"\r\n"
        } else {
            b"\n"
        }
    }
}

pub(crate) fn connect_line(host: Ipv4Addr) -> String {
    format!("{CONNECT_KEY}{host}:{TUNNEL_PORT}")
}

fn connect_value(line: &[u8]) -> Option<&[u8]> {
    line.trim_ascii()
        .strip_prefix(CONNECT_KEY.as_bytes())
        .map(<[u8]>::trim_ascii)
}

fn terminator_of(line: &[u8]) -> &'static [u8] {
    if line.ends_with(b"\r\n") {
        b"\r\n"
    } else if line.ends_with(b"\n") {
        b"\n"
    } else {
        b""
    }
}
