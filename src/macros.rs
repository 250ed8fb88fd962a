//! Declarative macros implementing [`Reflect`](crate::Reflect) for user types.

/// Declares a record struct together with its [`Reflect`](crate::Reflect) impl.
///
/// Field options follow the field type after `=>`:
/// `yaml = "name"`, `env = "VAR"`, `validate = "rules"` and `embedded`.
/// Fields declared with any visibility are exported. Capabilities the
/// struct implements are listed after its name.
///
/// ```
/// use rigid_yaml::record;
///
/// record! {
///     #[derive(Debug, Default)]
///     pub struct Server {
///         pub host: String => { yaml = "host" },
///         pub port: u16 => { yaml = "port", env = "SERVER_PORT", validate = "min=1" },
///     }
/// }
///
/// let mut server = Server::default();
/// rigid_yaml::load("host: localhost\nport: 8080\n", &mut server).unwrap();
/// assert_eq!(server.port, 8080);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(: $($cap:ident),+ )? {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
                $( => { $($opt:ident $(= $val:expr)?),* $(,)? } )?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Reflect for $name {
            fn shape() -> $crate::TypeShape {
                $crate::TypeShape::record::<Self>(
                    stringify!($name),
                    vec![
                        $(
                            $crate::FieldShape::new::<$ty>(
                                stringify!($field),
                                !stringify!($field_vis).is_empty(),
                            )
                            $($( .$opt($($val)?) )*)?
                        ),*
                    ],
                )
                $($( .with($crate::Capability::$cap) )+)?
            }

            fn reflect(&self) -> $crate::ValueRef<'_> {
                $crate::ValueRef::Record(vec![$(&self.$field as &dyn $crate::Reflect),*])
            }

            fn reflect_mut(&mut self) -> $crate::ValueMut<'_> {
                $crate::ValueMut::Record(vec![$(&mut self.$field as &mut dyn $crate::Reflect),*])
            }

            $($( $crate::__capability_hook!($cap); )+)?
        }
    };
}

/// Declares a named wrapper around another reflectable type.
///
/// The wrapper reflects like its content but is a distinct type with its
/// own capabilities.
#[macro_export]
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($inner_vis:vis $inner:ty) $(: $($cap:ident),+ )? ;
    ) => {
        $(#[$meta])*
        $vis struct $name($inner_vis $inner);

        impl $crate::Reflect for $name {
            fn shape() -> $crate::TypeShape {
                <$inner as $crate::Reflect>::shape()
                    .renamed::<Self>(stringify!($name))
                    $($( .with($crate::Capability::$cap) )+)?
            }

            fn reflect(&self) -> $crate::ValueRef<'_> {
                $crate::Reflect::reflect(&self.0)
            }

            fn reflect_mut(&mut self) -> $crate::ValueMut<'_> {
                $crate::Reflect::reflect_mut(&mut self.0)
            }

            $($( $crate::__capability_hook!($cap); )+)?
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __capability_hook {
    (Validate) => {
        fn as_validator(&self) -> ::std::option::Option<&dyn $crate::Validate> {
            ::std::option::Option::Some(self)
        }
    };
    (TextDecode) => {
        fn as_text_decoder(&mut self) -> ::std::option::Option<&mut dyn $crate::TextDecode> {
            ::std::option::Option::Some(self)
        }
    };
    (NodeDecode) => {
        fn as_node_decoder(&mut self) -> ::std::option::Option<&mut dyn $crate::NodeDecode> {
            ::std::option::Option::Some(self)
        }
    };
}
