use nom::{
    bytes::complete::{tag, take_till1, take_while1},
    character::complete::{line_ending, space1},
    sequence::{terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// The parts of an inbound callback request the listener cares about
#[derive(Debug, PartialEq)]
pub struct CallbackRequest {
    pub method: String,
    pub path: String,
    /// `state` query parameter, if the redirect carried one
    pub state: Option<String>,
}

/// Parses the request line of a raw HTTP/1.x request
///
/// Any method and any target are accepted; only the shape of the line is
/// checked.
pub fn parse_request(input: &str) -> Result<CallbackRequest> {
    let (_, (method, target)) =
        request_line(input).map_err(|_| Error::Callback("malformed request line".to_string()))?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let state = query.and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
    });

    Ok(CallbackRequest {
        method: method.to_string(),
        path: path.to_string(),
        state,
    })
}

fn request_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (remainder, (method, _, target, _, _)) = tuple((
        method_token,
        space1,
        request_target,
        space1,
        terminated(http_version, line_ending),
    ))(input)?;

    Ok((remainder, (method, target)))
}

fn method_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphabetic())(input)
}

fn request_target(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_ascii_whitespace())(input)
}

fn http_version(input: &str) -> IResult<&str, &str> {
    let (remainder, _) = tag("HTTP/")(input)?;
    take_while1(|c: char| c.is_ascii_digit() || c == '.')(remainder)
}
