/// Declares a packed, fixed-layout record.
///
/// One field list produces both the `scroll` (de)serializers and the record's
/// static [`Descriptor`](crate::codec::Descriptor), so the two can never disagree
/// about layout. Nested records are allowed as field types as long as they were
/// themselves declared with `packed!`.
macro_rules! packed {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Default,
            ::scroll::Pread, ::scroll::Pwrite, ::scroll::SizeWith
        )]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::codec::Packed for $name {
            const DESCRIPTOR: $crate::codec::Descriptor = $crate::codec::Descriptor {
                name: stringify!($name),
                fields: &[
                    $(
                        $crate::codec::Field {
                            name: stringify!($field),
                            kind: <$ty as $crate::codec::FieldType>::KIND,
                        },
                    )*
                ],
            };
        }

        impl $crate::codec::FieldType for $name {
            const KIND: $crate::codec::FieldKind =
                $crate::codec::FieldKind::Struct(&<$name as $crate::codec::Packed>::DESCRIPTOR);
        }
    };
}
