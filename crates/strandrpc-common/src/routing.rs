//! Routing key derivation.
//!
//! A routing key is `<qualified name>--<signature>`, for example
//! `math::add--fn(i32, i32) -> i32` or
//! `Calculator::add--fn(&Calculator, i32, i32) -> i32`.
//!
//! Keys are computed from a [`Procedure`] declaration that both sides of a
//! connection compile in. The signature half comes from [`TypeTag`], so two
//! procedures sharing a name but differing in argument or return types get
//! distinct keys, and so do two instantiations of one generic function.
//! Nothing here depends on compiler-generated type names, which keeps keys
//! stable across independently built binaries.

use std::fmt;
use std::marker::PhantomData;

/// Separator between the qualified name and the signature.
pub const KEY_SEPARATOR: &str = "--";

/// Stable, human-readable name of a type as it appears in a signature.
///
/// Implemented for primitives, `String`, `Vec<T>`, `Option<T>`, `Box<T>`
/// and tuples. User types opt in with [`type_tag!`](crate::type_tag).
pub trait TypeTag {
    fn type_tag() -> String;
}

/// An argument tuple whose element tags make up a parameter list.
pub trait ArgList {
    fn arg_tags() -> Vec<String>;
}

/// Implements [`TypeTag`] for user types.
///
/// The plain form uses the identifier itself; the `=>` form sets an explicit
/// tag, which is how a type keeps its key across renames.
///
/// ```
/// use strandrpc_common::{type_tag, TypeTag};
///
/// struct Point;
/// struct Legacy;
/// type_tag!(Point);
/// type_tag!(Legacy => "geo::Point");
///
/// assert_eq!(Point::type_tag(), "Point");
/// assert_eq!(Legacy::type_tag(), "geo::Point");
/// ```
#[macro_export]
macro_rules! type_tag {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $crate::routing::TypeTag for $ty {
                fn type_tag() -> ::std::string::String {
                    ::std::string::String::from(stringify!($ty))
                }
            }
        )+
    };
    ($($ty:ty => $tag:expr),+ $(,)?) => {
        $(
            impl $crate::routing::TypeTag for $ty {
                fn type_tag() -> ::std::string::String {
                    ::std::string::String::from($tag)
                }
            }
        )+
    };
}

macro_rules! primitive_tags {
    ($($ty:ty),+) => {
        $(
            impl TypeTag for $ty {
                fn type_tag() -> String {
                    String::from(stringify!($ty))
                }
            }
        )+
    };
}

primitive_tags!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String
);

impl TypeTag for () {
    fn type_tag() -> String {
        String::from("()")
    }
}

impl<T: TypeTag> TypeTag for Vec<T> {
    fn type_tag() -> String {
        format!("Vec<{}>", T::type_tag())
    }
}

impl<T: TypeTag> TypeTag for Option<T> {
    fn type_tag() -> String {
        format!("Option<{}>", T::type_tag())
    }
}

impl<T: TypeTag> TypeTag for Box<T> {
    fn type_tag() -> String {
        format!("Box<{}>", T::type_tag())
    }
}

impl ArgList for () {
    fn arg_tags() -> Vec<String> {
        Vec::new()
    }
}

macro_rules! tuple_tags {
    ($($name:ident),+) => {
        impl<$($name: TypeTag),+> ArgList for ($($name,)+) {
            fn arg_tags() -> Vec<String> {
                vec![$($name::type_tag()),+]
            }
        }

        impl<$($name: TypeTag),+> TypeTag for ($($name,)+) {
            fn type_tag() -> String {
                let tags = <Self as ArgList>::arg_tags();
                if tags.len() == 1 {
                    format!("({},)", tags[0])
                } else {
                    format!("({})", tags.join(", "))
                }
            }
        }
    };
}

tuple_tags!(A);
tuple_tags!(A, B);
tuple_tags!(A, B, C);
tuple_tags!(A, B, C, D);
tuple_tags!(A, B, C, D, E);
tuple_tags!(A, B, C, D, E, F);
tuple_tags!(A, B, C, D, E, F, G);
tuple_tags!(A, B, C, D, E, F, G, H);

/// Declaration of a remote procedure shared by client and server.
///
/// `Args` is the argument tuple and `Ret` the return type. Declarations are
/// `const` so they can live in an interface module both binaries import.
///
/// ```
/// use strandrpc_common::Procedure;
///
/// const ECHO: Procedure<(String,), String> = Procedure::function("echo");
/// const CALC_ADD: Procedure<(i32, i32), i32> = Procedure::method("Calculator", "add");
///
/// assert_eq!(ECHO.key(), "echo--fn(String) -> String");
/// assert_eq!(CALC_ADD.key(), "Calculator::add--fn(&Calculator, i32, i32) -> i32");
/// ```
pub struct Procedure<Args, Ret> {
    name: &'static str,
    owner: Option<&'static str>,
    _signature: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret> Procedure<Args, Ret> {
    /// A free or namespaced function, e.g. `"echo"` or `"math::add"`.
    pub const fn function(name: &'static str) -> Self {
        Procedure {
            name,
            owner: None,
            _signature: PhantomData,
        }
    }

    /// A method bound to an instance of `owner`.
    pub const fn method(owner: &'static str, name: &'static str) -> Self {
        Procedure {
            name,
            owner: Some(owner),
            _signature: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn owner(&self) -> Option<&'static str> {
        self.owner
    }

    pub fn qualified_name(&self) -> String {
        match self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.to_string(),
        }
    }
}

impl<Args: ArgList, Ret: TypeTag> Procedure<Args, Ret> {
    pub fn signature(&self) -> String {
        let mut params = Vec::new();
        if let Some(owner) = self.owner {
            params.push(format!("&{}", owner));
        }
        params.extend(Args::arg_tags());
        format!("fn({}) -> {}", params.join(", "), Ret::type_tag())
    }

    pub fn key(&self) -> String {
        format!("{}{}{}", self.qualified_name(), KEY_SEPARATOR, self.signature())
    }
}

impl<Args, Ret> Clone for Procedure<Args, Ret> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Args, Ret> Copy for Procedure<Args, Ret> {}

impl<Args, Ret> fmt::Debug for Procedure<Args, Ret> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish()
    }
}
