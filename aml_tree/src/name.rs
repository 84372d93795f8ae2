use crate::{
    opcode::{DUAL_NAME_PREFIX, MULTI_NAME_PREFIX, NULL_NAME, PREFIX_CHAR, ROOT_CHAR},
    stream::AmlStream,
    AmlError,
    AmlResult,
};
use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::{fmt, str};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameSeg(pub(crate) [u8; 4]);

impl NameSeg {
    pub fn from_str(string: &str) -> Result<NameSeg, AmlError> {
        // Each NameSeg can only have four chars, and must have at least one
        if string.is_empty() || string.len() > 4 {
            return Err(AmlError::InvalidNameSeg);
        }

        // We pre-fill the array with '_', so it will already be correct if the length is < 4
        let mut seg = [b'_'; 4];
        seg[..string.len()].copy_from_slice(string.as_bytes());
        NameSeg::from_bytes(seg)
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<NameSeg, AmlError> {
        if !is_lead_name_char(bytes[0]) || !bytes[1..].iter().all(|&b| is_name_char(b)) {
            return Err(AmlError::InvalidNameSeg);
        }

        Ok(NameSeg(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Every constructor checks the bytes are `NameChar`s, which are all ASCII
        str::from_utf8(&self.0).unwrap_or("????")
    }
}

// A list of ASCII codes is pretty much never useful, so we always just show it as a string
impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum NameComponent {
    Root,
    Prefix,
    Segment(NameSeg),
}

impl NameComponent {
    pub fn as_segment(self) -> Option<NameSeg> {
        match self {
            NameComponent::Segment(seg) => Some(seg),
            NameComponent::Root | NameComponent::Prefix => None,
        }
    }
}

/// A name, as it appears in AML or ASL. An empty name is the `NullName`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct AmlName(Vec<NameComponent>);

impl AmlName {
    pub fn root() -> AmlName {
        AmlName(vec![NameComponent::Root])
    }

    pub fn null() -> AmlName {
        AmlName(Vec::new())
    }

    pub fn from_name_seg(seg: NameSeg) -> AmlName {
        AmlName(vec![NameComponent::Segment(seg)])
    }

    pub fn from_components(components: Vec<NameComponent>) -> AmlName {
        AmlName(components)
    }

    pub fn components(&self) -> &[NameComponent] {
        &self.0
    }

    /// Convert a string representation of an AML name (e.g. `\_SB.PCI0`, `^^FOO`) into an `AmlName`.
    pub fn from_str(mut string: &str) -> Result<AmlName, AmlError> {
        if string.is_empty() {
            return Err(AmlError::EmptyNamesAreInvalid);
        }

        let mut components = Vec::new();

        // If it starts with a \, make it an absolute name
        if let Some(rest) = string.strip_prefix('\\') {
            components.push(NameComponent::Root);
            string = rest;
        }

        if !string.is_empty() {
            // Divide the rest of it into segments, and parse those
            for mut part in string.split('.') {
                // Handle prefix chars
                while let Some(rest) = part.strip_prefix('^') {
                    components.push(NameComponent::Prefix);
                    part = rest;
                }

                components.push(NameComponent::Segment(NameSeg::from_str(part)?));
            }
        }

        Ok(AmlName(components))
    }

    pub fn as_string(&self) -> String {
        self.0
            .iter()
            .fold(String::new(), |name, component| match component {
                NameComponent::Root => name + "\\",
                NameComponent::Prefix => name + "^",
                NameComponent::Segment(seg) => name + seg.as_str() + ".",
            })
            .trim_end_matches('.')
            .to_string()
    }

    pub fn segments(&self) -> impl Iterator<Item = NameSeg> + '_ {
        self.0.iter().filter_map(|component| component.as_segment())
    }

    pub fn last_segment(&self) -> Option<NameSeg> {
        self.0.last().and_then(|component| component.as_segment())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    /// An AML path is normal if it does not contain any prefix elements ("^" characters, when
    /// expressed as a string).
    pub fn is_normal(&self) -> bool {
        !self.0.contains(&NameComponent::Prefix)
    }

    pub fn is_absolute(&self) -> bool {
        self.0.first() == Some(&NameComponent::Root)
    }

    /// Special rules apply when searching for certain paths (specifically, those that are made up
    /// of a single name segment). Returns `true` if those rules apply.
    pub fn search_rules_apply(&self) -> bool {
        matches!(self.0[..], [NameComponent::Segment(_)])
    }

    /// Normalize an AML path, resolving prefix chars. Returns `AmlError::InvalidNormalizedName` if the path
    /// normalizes to an invalid path (e.g. `\^_FOO`)
    pub fn normalize(self) -> Result<AmlName, AmlError> {
        if self.is_normal() {
            return Ok(self);
        }

        let mut normalized = Vec::with_capacity(self.0.len());
        for &component in &self.0 {
            match component {
                NameComponent::Root | NameComponent::Segment(_) => normalized.push(component),
                NameComponent::Prefix => match normalized.last() {
                    Some(NameComponent::Segment(_)) => {
                        normalized.pop();
                    }
                    _ => return Err(AmlError::InvalidNormalizedName(self.clone())),
                },
            }
        }

        Ok(AmlName(normalized))
    }

    /// Get the parent of this `AmlName`. For example, the parent of `\_SB.PCI0._PRT` is `\_SB.PCI0`.
    pub fn parent(&self) -> Result<AmlName, AmlError> {
        let mut normalized_self = self.clone().normalize()?;

        match normalized_self.0.last() {
            None | Some(NameComponent::Root) => Err(AmlError::RootHasNoParent),
            Some(NameComponent::Segment(_)) => {
                normalized_self.0.pop();
                Ok(normalized_self)
            }
            Some(NameComponent::Prefix) => unreachable!(), // Prefix chars are removed by normalization
        }
    }

    /// Resolve this path against a given scope, making it absolute. If the path is absolute, it is
    /// returned directly. The path is also normalized.
    pub fn resolve(&self, scope: &AmlName) -> Result<AmlName, AmlError> {
        if self.is_absolute() {
            return self.clone().normalize();
        }

        let mut resolved_path = scope.clone();
        resolved_path.0.extend_from_slice(&self.0);
        resolved_path.normalize()
    }

    /// Encode this name as an AML `NameString`.
    pub fn to_aml_bytes(&self) -> AmlResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut segments = Vec::new();

        for component in &self.0 {
            match component {
                NameComponent::Root if bytes.is_empty() && segments.is_empty() => bytes.push(ROOT_CHAR),
                NameComponent::Prefix if segments.is_empty() => bytes.push(PREFIX_CHAR),
                NameComponent::Segment(seg) => segments.push(*seg),
                _ => return Err(AmlError::InvalidNameString),
            }
        }

        match segments.len() {
            0 => bytes.push(NULL_NAME),
            1 => {}
            2 => bytes.push(DUAL_NAME_PREFIX),
            n => {
                bytes.push(MULTI_NAME_PREFIX);
                bytes.push(u8::try_from(n).map_err(|_| AmlError::InvalidNameString)?);
            }
        }
        for seg in segments {
            bytes.extend_from_slice(&seg.0);
        }

        Ok(bytes)
    }
}

impl fmt::Display for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// Parse a `NameString` from the stream.
pub fn parse_name_string(stream: &mut AmlStream) -> AmlResult<AmlName> {
    /*
     * NameString := <RootChar('\') NamePath> | <PrefixPath NamePath>
     * PrefixPath := Nothing | <'^' PrefixPath>
     * NamePath := NameSeg | DualNamePath | MultiNamePath | NullName
     * DualNamePath := 0x2e NameSeg NameSeg
     * MultiNamePath := 0x2f ByteData{SegCount} NameSeg(SegCount)
     */
    let mut components = Vec::new();

    if stream.peek()? == ROOT_CHAR {
        stream.next()?;
        components.push(NameComponent::Root);
    } else {
        while stream.peek()? == PREFIX_CHAR {
            stream.next()?;
            components.push(NameComponent::Prefix);
        }
    }

    let seg_count = match stream.peek()? {
        NULL_NAME => {
            stream.next()?;
            0
        }
        DUAL_NAME_PREFIX => {
            stream.next()?;
            2
        }
        MULTI_NAME_PREFIX => {
            stream.next()?;
            stream.next()? as usize
        }
        byte if is_lead_name_char(byte) => 1,
        _ => return Err(AmlError::InvalidNameString),
    };

    for _ in 0..seg_count {
        let bytes = stream.take(4)?;
        let seg = NameSeg::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])?;
        components.push(NameComponent::Segment(seg));
    }

    Ok(AmlName(components))
}

/// Returns `true` if `byte` can start a `NameString`. `NullName` is deliberately not included, as it can't be told
/// apart from `ZeroOp` without knowing where in the grammar we are.
pub fn is_name_string_start(byte: u8) -> bool {
    matches!(byte, ROOT_CHAR | PREFIX_CHAR | DUAL_NAME_PREFIX | MULTI_NAME_PREFIX) || is_lead_name_char(byte)
}

pub fn is_lead_name_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte == b'_'
}

pub fn is_name_char(byte: u8) -> bool {
    is_lead_name_char(byte) || byte.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aml_name_from_str() {
        assert_eq!(AmlName::from_str(""), Err(AmlError::EmptyNamesAreInvalid));
        assert_eq!(AmlName::from_str("\\"), Ok(AmlName::root()));
        assert_eq!(
            AmlName::from_str("\\_SB.PCI0"),
            Ok(AmlName(vec![
                NameComponent::Root,
                NameComponent::Segment(NameSeg(*b"_SB_")),
                NameComponent::Segment(NameSeg(*b"PCI0"))
            ]))
        );
        assert_eq!(
            AmlName::from_str("\\_SB.^^^PCI0"),
            Ok(AmlName(vec![
                NameComponent::Root,
                NameComponent::Segment(NameSeg(*b"_SB_")),
                NameComponent::Prefix,
                NameComponent::Prefix,
                NameComponent::Prefix,
                NameComponent::Segment(NameSeg(*b"PCI0"))
            ]))
        );
        assert_eq!(AmlName::from_str("\\_SB.1ABC"), Err(AmlError::InvalidNameSeg));
        assert_eq!(AmlName::from_str("\\_SB.ABCDE"), Err(AmlError::InvalidNameSeg));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(
            AmlName::from_str("\\_SB.^PCI0").unwrap().normalize(),
            Ok(AmlName::from_str("\\PCI0").unwrap())
        );
        assert_eq!(
            AmlName::from_str("_SB.PCI0.^FOO.BAR").unwrap().normalize(),
            Ok(AmlName::from_str("_SB.FOO.BAR").unwrap())
        );
        assert_eq!(
            AmlName::from_str("\\^_SB").unwrap().normalize(),
            Err(AmlError::InvalidNormalizedName(AmlName::from_str("\\^_SB").unwrap()))
        );
    }

    #[test]
    fn test_resolve_and_parent() {
        let scope = AmlName::from_str("\\_SB.PCI0").unwrap();
        assert_eq!(AmlName::from_str("^FOO").unwrap().resolve(&scope), Ok(AmlName::from_str("\\_SB.FOO").unwrap()));
        assert_eq!(AmlName::from_str("\\BAR").unwrap().resolve(&scope), Ok(AmlName::from_str("\\BAR").unwrap()));
        assert_eq!(scope.parent(), Ok(AmlName::from_str("\\_SB").unwrap()));
        assert_eq!(AmlName::root().parent(), Err(AmlError::RootHasNoParent));
    }

    #[test]
    fn test_search_rules_apply() {
        assert!(!AmlName::root().search_rules_apply());
        assert!(!AmlName::from_str("\\_SB").unwrap().search_rules_apply());
        assert!(!AmlName::from_str("^VGA").unwrap().search_rules_apply());
        assert!(!AmlName::from_str("_SB.PCI0.VGA").unwrap().search_rules_apply());
        assert!(AmlName::from_str("VGA").unwrap().search_rules_apply());
    }

    #[test]
    fn parse_name_strings() {
        assert_eq!(
            parse_name_string(&mut AmlStream::new(b"\\\x2eABC_DEF_")),
            Ok(AmlName::from_str("\\ABC.DEF").unwrap())
        );
        assert_eq!(parse_name_string(&mut AmlStream::new(b"^^_GHI")), Ok(AmlName::from_str("^^_GHI").unwrap()));
        assert_eq!(
            parse_name_string(&mut AmlStream::new(b"\x2f\x03A___B___C___")),
            Ok(AmlName::from_str("A.B.C").unwrap())
        );
        assert_eq!(parse_name_string(&mut AmlStream::new(b"\\\x00")), Ok(AmlName::root()));
        assert_eq!(parse_name_string(&mut AmlStream::new(b"\x2eAB")), Err(AmlError::UnexpectedEndOfStream));
        assert_eq!(parse_name_string(&mut AmlStream::new(b"\x15")), Err(AmlError::InvalidNameString));
    }

    #[test]
    fn encode_name_strings() {
        for name in ["\\", "\\_SB", "_SB.PCI0", "^^_GHI", "\\_SB.PCI0.LPC0.COM1"] {
            let name = AmlName::from_str(name).unwrap();
            let bytes = name.to_aml_bytes().unwrap();
            let mut stream = AmlStream::new(&bytes);
            assert_eq!(parse_name_string(&mut stream), Ok(name));
            assert!(stream.is_empty());
        }
        assert_eq!(AmlName::from_str("_SB.PCI0").unwrap().to_aml_bytes().unwrap(), b"\x2e_SB_PCI0");
        assert_eq!(AmlName::from_str("_SB.^PCI0").unwrap().to_aml_bytes(), Err(AmlError::InvalidNameString));
    }
}
