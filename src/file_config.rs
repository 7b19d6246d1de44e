//! INI configuration for the appender.
//!
//! A single section holds the appender options, using the option names as
//! keys. `additional_field` may repeat, one `key=value` entry per line:
//!
//! ```ini
//! [gelf]
//! host = graylog.internal
//! protocol = TCP
//! overflow_strategy = FAILOVER
//! additional_field = env=prod
//! additional_field = team=payments
//! ```

use std::path::Path;
use std::str::FromStr;

use ini::Ini;

use crate::appender::GelfAppenderBuilder;
use crate::config::ConfigError;
use crate::level::Severity;

/// Read `section` from the INI file at `path`.
pub fn load_ini(path: impl AsRef<Path>, section: &str) -> Result<GelfAppenderBuilder, ConfigError> {
    let path = path.as_ref();
    let ini = Ini::load_from_file(path)
        .map_err(|err| ConfigError::Ini(format!("{}: {err}", path.display())))?;
    from_ini(&ini, section)
}

/// Read `section` from INI text.
pub fn load_ini_str(text: &str, section: &str) -> Result<GelfAppenderBuilder, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Ini(err.to_string()))?;
    from_ini(&ini, section)
}

fn parse<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        reason: format!("cannot parse '{raw}'"),
    })
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            reason: format!("expected a boolean, found '{raw}'"),
        }),
    }
}

fn from_ini(ini: &Ini, section: &str) -> Result<GelfAppenderBuilder, ConfigError> {
    let props = ini
        .section(Some(section))
        .ok_or_else(|| ConfigError::MissingSection(section.to_owned()))?;
    let mut builder = GelfAppenderBuilder::new();
    for (key, value) in props.iter() {
        builder = match key {
            "host" => builder.host(value.trim()),
            "port" => builder.port(parse("port", value)?),
            "protocol" => builder.protocol(value.trim()),
            "queue_size" => builder.queue_size(parse("queue_size", value)?),
            "queue_process_rate" => {
                builder.queue_process_rate_ms(parse("queue_process_rate", value)?)
            }
            "tls_enabled" => builder.tls_enabled(parse_bool("tls_enabled", value)?),
            "tls_cert_verification" => {
                builder.tls_cert_verification(parse_bool("tls_cert_verification", value)?)
            }
            "reconnect_delay" => builder.reconnect_delay_ms(parse("reconnect_delay", value)?),
            "connect_timeout" => builder.connect_timeout_ms(parse("connect_timeout", value)?),
            "tcp_no_delay" => builder.tcp_no_delay(parse_bool("tcp_no_delay", value)?),
            "tcp_keep_alive" => builder.tcp_keep_alive(parse_bool("tcp_keep_alive", value)?),
            "send_buffer_size" => builder.send_buffer_size(parse("send_buffer_size", value)?),
            "max_inflight_sends" => {
                builder.max_inflight_sends(parse("max_inflight_sends", value)?)
            }
            "threads" => builder.threads(parse("threads", value)?),
            "overflow_strategy" => builder.overflow_strategy(value.trim()),
            "secondary_port" => builder.secondary_port(parse("secondary_port", value)?),
            "blocking_threshold" => builder.blocking_threshold(
                value
                    .parse::<Severity>()
                    .map_err(|()| ConfigError::InvalidValue {
                        field: "blocking_threshold",
                        reason: format!("unknown severity '{value}'"),
                    })?,
            ),
            "origin_host" => builder.origin_host(value.trim()),
            "facility" => builder.facility(value.trim()),
            "additional_field" => builder.additional_field(value),
            "include_location" => builder.include_location(parse_bool("include_location", value)?),
            "include_logger" => builder.include_logger(parse_bool("include_logger", value)?),
            "include_thread" => builder.include_thread(parse_bool("include_thread", value)?),
            "include_marker" => builder.include_marker(parse_bool("include_marker", value)?),
            "include_context" => builder.include_context(parse_bool("include_context", value)?),
            "max_chunk_size" => builder.max_chunk_size(parse("max_chunk_size", value)?),
            "shutdown_timeout" => builder.shutdown_timeout_ms(parse("shutdown_timeout", value)?),
            other => return Err(ConfigError::UnknownKey(other.to_owned())),
        };
    }
    Ok(builder)
}
